/// Result of validating a shell/PowerShell command before it is allowed to
/// reach an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub fixed_command: Option<String>,
}

/// Syntax validation and conservative auto-fix for PowerShell (and, for
/// agents advertising a bash/python capability, a generic script) commands.
/// Only fixes in the `auto-fixable` category may rewrite a command in
/// place per guardrail rule 1(d); everything else surfaces as a
/// `syntax_error` at execution time for the LLM to address via replan.
pub struct ScriptValidator;

impl ScriptValidator {
    /// Validates balance of quotes, braces, parens, `$(...)`/`${...}`
    /// subexpressions, and PowerShell here-strings (`@"..."@`).
    pub fn validate(command: &str) -> ValidationResult {
        let mut errors = Vec::new();

        if !Self::balanced(command, '(', ')') {
            errors.push("unbalanced parentheses".to_owned());
        }
        if !Self::balanced(command, '{', '}') {
            errors.push("unbalanced braces".to_owned());
        }
        if !Self::quotes_balanced(command) {
            errors.push("unbalanced quotes".to_owned());
        }
        if !Self::here_strings_balanced(command) {
            errors.push("unterminated here-string".to_owned());
        }

        let fixed_command = if errors.is_empty() {
            None
        } else {
            Self::attempt_autofix(command, &errors)
        };

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            fixed_command,
        }
    }

    fn balanced(s: &str, open: char, close: char) -> bool {
        let mut depth: i32 = 0;
        let mut in_single = false;
        let mut in_double = false;
        for c in s.chars() {
            match c {
                '\'' if !in_double => in_single = !in_single,
                '"' if !in_single => in_double = !in_double,
                c if c == open && !in_single && !in_double => depth += 1,
                c if c == close && !in_single && !in_double => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    fn quotes_balanced(s: &str) -> bool {
        let singles = s.chars().filter(|&c| c == '\'').count();
        let doubles = s.matches('"').count();
        singles % 2 == 0 && doubles % 2 == 0
    }

    fn here_strings_balanced(s: &str) -> bool {
        let opens = s.matches("@\"").count() + s.matches("@'").count();
        let closes = s.matches("\"@").count() + s.matches("'@").count();
        opens == closes
    }

    /// Only a narrow set of mistakes are considered safe to fix silently:
    /// a missing closing quote at end-of-line, smart-quote replacement,
    /// and a trailing stray continuation backtick.
    fn attempt_autofix(command: &str, errors: &[String]) -> Option<String> {
        let mut fixed = command.to_owned();
        let mut changed = false;

        if fixed.contains('\u{201c}') || fixed.contains('\u{201d}') {
            fixed = fixed.replace(['\u{201c}', '\u{201d}'], "\"");
            changed = true;
        }
        if fixed.contains('\u{2018}') || fixed.contains('\u{2019}') {
            fixed = fixed.replace(['\u{2018}', '\u{2019}'], "'");
            changed = true;
        }

        if errors.iter().any(|e| e == "unbalanced quotes") {
            let doubles = fixed.matches('"').count();
            if doubles % 2 == 1 {
                fixed.push('"');
                changed = true;
            }
        }

        if fixed.trim_end().ends_with('`') {
            fixed = fixed.trim_end().trim_end_matches('`').to_owned();
            changed = true;
        }

        changed.then_some(fixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_command_is_valid() {
        let res = ScriptValidator::validate("Get-Process | Where-Object { $_.CPU -gt 10 }");
        assert!(res.valid);
    }

    #[test]
    fn unbalanced_quote_is_autofixed() {
        let res = ScriptValidator::validate("Write-Output \"hello");
        assert!(!res.valid);
        assert_eq!(res.fixed_command.as_deref(), Some("Write-Output \"hello\""));
    }

    #[test]
    fn smart_quotes_are_autofixed() {
        let res = ScriptValidator::validate("Write-Output \u{201c}hi\u{201d}");
        assert!(!res.valid);
        assert_eq!(res.fixed_command.as_deref(), Some("Write-Output \"hi\""));
    }
}
