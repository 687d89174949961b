// ABOUTME: Shell command structure analysis: quote-aware splitting on pipes and chain operators.
// ABOUTME: Used to spot compound commands and to derive allowlist patterns from approved commands.

/// How a segment is joined to the segment before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `;` or a newline
    Sequence,
    /// `|`
    Pipe,
}

/// One simple command inside a larger command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSegment {
    pub executable: String,
    pub args: Vec<String>,
    /// `None` for the first segment.
    pub joined_by: Option<Operator>,
}

/// Tools whose first argument is a subcommand worth keeping in an allowlist pattern.
const SUBCOMMAND_TOOLS: &[&str] = &[
    "git", "npm", "pnpm", "yarn", "cargo", "docker", "kubectl", "go", "pip", "pip3", "make",
];

/// Split a command line into its simple commands.
///
/// Operators inside single or double quotes are ignored. Leading `VAR=value`
/// assignments are skipped when picking the executable.
pub fn parse_pipeline(command: &str) -> Vec<CommandSegment> {
    let mut segments = Vec::new();
    let mut pending_op = None;

    for (op, text) in split_operators(command) {
        let mut words = shell_words(&text)
            .into_iter()
            .skip_while(|w| is_assignment(w));

        match words.next() {
            Some(executable) => {
                segments.push(CommandSegment {
                    executable,
                    args: words.collect(),
                    joined_by: if segments.is_empty() { None } else { op.or(pending_op) },
                });
                pending_op = None;
            }
            // Empty text between operators: keep the operator for the next segment.
            None => pending_op = op.or(pending_op),
        }
    }
    segments
}

/// True when the command line chains or pipes more than one command.
pub fn is_compound(command: &str) -> bool {
    parse_pipeline(command).len() > 1
}

/// The raw text of each simple command in a command line, trimmed, with the
/// joining operators removed. Quoting is left intact.
pub fn command_segments(command: &str) -> Vec<String> {
    split_operators(command)
        .into_iter()
        .map(|(_, text)| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

/// Derive a prefix pattern suitable for remembering an approved command.
///
/// Keeps the executable, plus the subcommand for tools like git or cargo.
/// Compound commands yield `None`: remembering only their first segment would
/// approve whatever follows it.
pub fn allowlist_pattern(command: &str) -> Option<String> {
    let segments = parse_pipeline(command);
    let [segment] = segments.as_slice() else {
        return None;
    };

    let name = segment
        .executable
        .rsplit('/')
        .next()
        .unwrap_or(&segment.executable);

    if SUBCOMMAND_TOOLS.contains(&name) {
        if let Some(sub) = segment.args.first().filter(|a| !a.starts_with('-')) {
            return Some(format!("{} {}", segment.executable, sub));
        }
    }
    Some(segment.executable.clone())
}

fn is_assignment(word: &str) -> bool {
    let Some((name, _)) = word.split_once('=') else {
        return false;
    };
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on `&&`, `||`, `;`, newlines and `|`, respecting quotes and backslashes.
///
/// Each returned chunk carries the operator that preceded it.
fn split_operators(input: &str) -> Vec<(Option<Operator>, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut op = None;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q == '"' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        let next_op = match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
                continue;
            }
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                Operator::And
            }
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                Operator::Or
            }
            '|' => Operator::Pipe,
            ';' | '\n' => Operator::Sequence,
            _ => {
                current.push(c);
                continue;
            }
        };

        parts.push((op, std::mem::take(&mut current)));
        op = Some(next_op);
    }
    parts.push((op, current));
    parts
}

/// Quote-aware word splitting with backslash escapes.
fn shell_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('"'), '"') => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), _) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_command() {
        let segments = parse_pipeline("ls -la /tmp");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].executable, "ls");
        assert_eq!(segments[0].args, vec!["-la", "/tmp"]);
        assert_eq!(segments[0].joined_by, None);
    }

    #[test]
    fn parse_pipes_and_chains() {
        let segments = parse_pipeline("cat log | grep err && echo done; wc -l || true");
        let ops: Vec<_> = segments.iter().map(|s| s.joined_by).collect();
        assert_eq!(
            ops,
            vec![
                None,
                Some(Operator::Pipe),
                Some(Operator::And),
                Some(Operator::Sequence),
                Some(Operator::Or),
            ]
        );
        let exes: Vec<_> = segments.iter().map(|s| s.executable.as_str()).collect();
        assert_eq!(exes, vec!["cat", "grep", "echo", "wc", "true"]);
    }

    #[test]
    fn operators_inside_quotes_are_literal() {
        let segments = parse_pipeline(r#"echo "a | b && c" 'd ; e'"#);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].args, vec!["a | b && c", "d ; e"]);
    }

    #[test]
    fn empty_quotes_produce_an_empty_word() {
        let segments = parse_pipeline(r#"git commit -m """#);
        assert_eq!(segments[0].args, vec!["commit", "-m", ""]);
    }

    #[test]
    fn leading_assignments_are_skipped() {
        let segments = parse_pipeline("RUST_LOG=debug FOO=1 cargo test");
        assert_eq!(segments[0].executable, "cargo");
        assert_eq!(segments[0].args, vec!["test"]);
    }

    #[test]
    fn compound_detection() {
        assert!(is_compound("make && make install"));
        assert!(is_compound("ps aux | grep node"));
        assert!(!is_compound("echo 'a && b'"));
        assert!(!is_compound(""));
    }

    #[test]
    fn segments_keep_raw_text() {
        assert_eq!(
            command_segments("ls -la && echo 'a | b' | wc -l;"),
            vec!["ls -la", "echo 'a | b'", "wc -l"]
        );
        assert_eq!(command_segments("  pwd  "), vec!["pwd"]);
        assert!(command_segments(" ; ").is_empty());
    }

    #[test]
    fn allowlist_pattern_keeps_subcommand() {
        assert_eq!(allowlist_pattern("npm install --save lodash").as_deref(), Some("npm install"));
        assert_eq!(allowlist_pattern("git status -s").as_deref(), Some("git status"));
        assert_eq!(allowlist_pattern("git --version").as_deref(), Some("git"));
        assert_eq!(allowlist_pattern("python3 script.py").as_deref(), Some("python3"));
    }

    #[test]
    fn allowlist_pattern_refuses_compound_and_empty() {
        assert_eq!(allowlist_pattern("ls && rm -rf build"), None);
        assert_eq!(allowlist_pattern("   "), None);
    }
}
