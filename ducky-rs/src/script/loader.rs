//! Program loader: script text → token sequence + function table.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::debug;

use super::error::LoadError;
use super::lexer::parse_line;
use super::token::{Token, TokenKind};
use super::{FUNC_NAME_LEN, MAX_FUNCS, MAX_LINE_LEN, MAX_TOKENS};

/// A `FUNCTION name … END_FUNCTION` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// Index of the first token after `FUNCTION`.
    pub body_start: usize,
    /// Index of the matching `END_FUNCTION`.
    pub body_end: usize,
}

/// A tokenized script and the functions it defines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    tokens: Vec<Token>,
    functions: Vec<Function>,
}

impl Program {
    /// Wrap a token sequence.  No functions are registered until
    /// [`discover`](Self::discover) runs.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, functions: Vec::new() }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Look up a function by name.  The first definition wins.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Rebuild the function table.
    ///
    /// Every `FUNCTION` token must have an `END_FUNCTION` somewhere after it.
    /// Registration is all-or-nothing: on any failure the table is left
    /// empty.
    pub fn discover(&mut self) -> Result<(), LoadError> {
        self.functions.clear();
        let mut found = Vec::new();
        for (i, tok) in self.tokens.iter().enumerate() {
            let TokenKind::Function(name) = &tok.kind else {
                continue;
            };
            let name = name.trim();
            if name.chars().count() > FUNC_NAME_LEN {
                return Err(LoadError::FunctionNameTooLong { line: tok.line, max: FUNC_NAME_LEN });
            }
            let body_end = self.tokens[i + 1..]
                .iter()
                .position(|t| t.kind == TokenKind::EndFunction)
                .map(|off| i + 1 + off)
                .ok_or_else(|| LoadError::UnmatchedFunction {
                    name: name.to_string(),
                    line: tok.line,
                })?;
            if found.len() >= MAX_FUNCS {
                return Err(LoadError::TooManyFunctions { line: tok.line, max: MAX_FUNCS });
            }
            found.push(Function {
                name: name.to_string(),
                body_start: i + 1,
                body_end,
            });
        }
        self.functions = found;
        Ok(())
    }

    // ── Loading ───────────────────────────────────────────────────────────

    /// Parse a script held in memory.
    pub fn parse_str(src: &str) -> Result<Self, LoadError> {
        Self::parse_reader(src.as_bytes())
    }

    /// Parse a script file.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let file = File::open(path.as_ref())?;
        Self::parse_reader(BufReader::new(file))
    }

    /// Parse a script from any line source.
    ///
    /// The first failing line aborts the load; nothing partial is returned.
    /// Blank and `REM` lines produce no token but still count toward the
    /// line numbers stamped on later tokens.  Bytes that are not valid
    /// UTF-8 decode as U+FFFD.
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<Self, LoadError> {
        let mut tokens = Vec::new();
        for (idx, bytes) in reader.split(b'\n').enumerate() {
            let bytes = bytes?;
            let line_no = idx + 1;
            let text = String::from_utf8_lossy(&bytes);
            let line = text.strip_suffix('\r').unwrap_or(&text);

            let parsed = parse_line(line);
            if parsed == Ok(TokenKind::Comment) {
                continue;
            }
            if line.trim_end().chars().count() > MAX_LINE_LEN {
                return Err(LoadError::LineTooLong { line: line_no, max: MAX_LINE_LEN });
            }
            let kind = parsed.map_err(|e| LoadError::Syntax {
                line: line_no,
                message: e.message,
            })?;
            if tokens.len() >= MAX_TOKENS {
                return Err(LoadError::TooManyCommands { line: line_no, max: MAX_TOKENS });
            }
            tokens.push(Token::new(kind, line_no));
        }

        let mut program = Self::new(tokens);
        program.discover()?;
        debug!(
            "loaded {} commands, {} functions",
            program.tokens.len(),
            program.functions.len()
        );
        Ok(program)
    }
}

/// Number of lines in a script, blank and comment lines included.
pub fn count_lines<R: BufRead>(reader: R) -> io::Result<usize> {
    let mut count = 0;
    for line in reader.split(b'\n') {
        line?;
        count += 1;
    }
    Ok(count)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn line_numbers_count_skipped_lines() {
        let p = Program::parse_str("REM header\n\nSTRING a\n   \nDELAY 5\n").unwrap();
        let lines: Vec<usize> = p.tokens().iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![3, 5]);
    }

    #[test]
    fn hello_delay() {
        let p = Program::parse_str("STRING Hello\nDELAY 100\n").unwrap();
        let kinds: Vec<&TokenKind> = p.tokens().iter().map(|t| &t.kind).collect();
        assert_eq!(
            kinds,
            vec![&TokenKind::String("Hello".into()), &TokenKind::Delay(100)]
        );
    }

    #[test]
    fn unknown_command_reports_line() {
        let err = Program::parse_str("STRING ok\nFOO\n").unwrap_err();
        assert_eq!(err.to_string(), "Unknown command: FOO");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn function_bounds() {
        let p = Program::parse_str("FUNCTION f\nSTRING hi\nEND_FUNCTION\nCALL f\n").unwrap();
        assert_eq!(
            p.function("f"),
            Some(&Function { name: "f".into(), body_start: 1, body_end: 2 })
        );
        assert!(p.function("g").is_none());
    }

    #[test]
    fn unmatched_function_rejects_program() {
        let err = Program::parse_str("FUNCTION ok\nEND_FUNCTION\nFUNCTION bad\nSTRING x\n")
            .unwrap_err();
        assert_eq!(err.to_string(), "Unmatched FUNCTION 'bad' at line 3");
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn discover_is_all_or_nothing() {
        let mut p = Program::parse_str("FUNCTION a\nEND_FUNCTION\n").unwrap();
        assert_eq!(p.functions().len(), 1);
        p.tokens.push(Token::new(TokenKind::Function("b".into()), 9));
        assert!(p.discover().is_err());
        assert!(p.functions().is_empty());
    }

    #[test]
    fn too_many_functions() {
        let mut src = String::new();
        for i in 0..=MAX_FUNCS {
            src.push_str(&format!("FUNCTION f{i}\nEND_FUNCTION\n"));
        }
        let err = Program::parse_str(&src).unwrap_err();
        assert!(matches!(err, LoadError::TooManyFunctions { max: MAX_FUNCS, .. }));
    }

    #[test]
    fn function_name_too_long() {
        let src = format!("FUNCTION {}\nEND_FUNCTION\n", "n".repeat(FUNC_NAME_LEN + 1));
        let err = Program::parse_str(&src).unwrap_err();
        assert!(matches!(err, LoadError::FunctionNameTooLong { line: 1, .. }));
    }

    #[test]
    fn token_cap_is_an_error() {
        let src = "ENTER\n".repeat(MAX_TOKENS + 1);
        let err = Program::parse_str(&src).unwrap_err();
        assert_eq!(err.to_string(), format!("Too many commands (max {MAX_TOKENS})"));
        assert_eq!(err.line(), Some(MAX_TOKENS + 1));

        let src = "ENTER\n".repeat(MAX_TOKENS);
        assert_eq!(Program::parse_str(&src).unwrap().len(), MAX_TOKENS);
    }

    #[test]
    fn long_line_rejected() {
        let src = format!("STRING {}\n", "x".repeat(MAX_LINE_LEN));
        let err = Program::parse_str(&src).unwrap_err();
        assert!(matches!(err, LoadError::LineTooLong { line: 1, .. }));
    }

    #[test]
    fn long_comment_is_skipped() {
        let src = format!("REM {}\nENTER\n", "x".repeat(MAX_LINE_LEN * 2));
        let p = Program::parse_str(&src).unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p.tokens()[0].line, 2);
    }

    #[test]
    fn invalid_utf8_in_comment_is_harmless() {
        let p = Program::parse_reader(&b"STRING ok\nREM caf\xe9\nSTRING done\n"[..]).unwrap();
        let lines: Vec<usize> = p.tokens().iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 3]);
        assert_eq!(p.tokens()[1].kind, TokenKind::String("done".into()));
    }

    #[test]
    fn invalid_utf8_in_string_is_replaced() {
        let p = Program::parse_reader(&b"REM x\r\nSTRING caf\xe9\r\n"[..]).unwrap();
        assert_eq!(p.tokens()[0].kind, TokenKind::String("caf\u{FFFD}".into()));
        assert_eq!(p.tokens()[0].line, 2);
    }

    #[test]
    fn crlf_lines() {
        let p = Program::parse_str("STRING a\r\nENTER\r\n").unwrap();
        assert_eq!(p.tokens()[0].kind, TokenKind::String("a".into()));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn parse_file_and_count_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "REM x\nSTRING hi\n\nENTER").unwrap();
        let p = Program::parse_file(f.path()).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.tokens()[1].line, 4);

        let n = count_lines(BufReader::new(File::open(f.path()).unwrap())).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Program::parse_file("/definitely/not/here.ds").unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
        assert_eq!(err.line(), None);
    }
}
