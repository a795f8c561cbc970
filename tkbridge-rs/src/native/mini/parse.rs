//! Script and list syntax for the in-process interpreter.
//!
//! A script is a sequence of commands separated by newlines or `;`.  Each
//! command is a sequence of words; a word is made of [`Part`]s that are
//! substituted at evaluation time.
//!
//! | Word form     | Substitutions                    |
//! |---------------|----------------------------------|
//! | `{...}`       | none (backslash-newline → space) |
//! | `"..."`       | `$var`, `[cmd]`, `\x`            |
//! | bare          | `$var`, `[cmd]`, `\x`            |

/// One piece of a word.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Lit(String),
    /// `$name` or `$name(index)`; the index is itself substituted.
    Var { name: String, index: Option<Vec<Part>> },
    /// `[script]`
    Cmd(String),
}

pub type Word = Vec<Part>;
pub type Command = Vec<Word>;

// ── Script parser ─────────────────────────────────────────────────────────────

/// Parse `src` into commands.
pub fn parse_script(src: &str) -> Result<Vec<Command>, String> {
    let mut p = Parser { chars: src.chars().collect(), pos: 0 };
    let mut commands = Vec::new();
    loop {
        p.skip_command_separators();
        if p.at_end() {
            break;
        }
        if p.peek() == Some('#') {
            p.skip_comment();
            continue;
        }
        let words = p.parse_command()?;
        if !words.is_empty() {
            commands.push(words);
        }
    }
    Ok(commands)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_command_separators(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ';' {
                self.pos += 1;
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\\' {
                self.pos += 1;
            } else if c == '\n' {
                break;
            }
        }
    }

    /// Skip blanks between words; `true` when the command ended.
    fn skip_word_separators(&mut self) -> bool {
        while let Some(c) = self.peek() {
            match c {
                '\n' | ';' => {
                    self.pos += 1;
                    return true;
                }
                '\\' if self.peek_at(1) == Some('\n') => self.pos += 2,
                c if c.is_whitespace() => self.pos += 1,
                _ => return false,
            }
        }
        true
    }

    fn parse_command(&mut self) -> Result<Command, String> {
        let mut words = Vec::new();
        loop {
            words.push(self.parse_word()?);
            if self.skip_word_separators() {
                return Ok(words);
            }
        }
    }

    fn parse_word(&mut self) -> Result<Word, String> {
        match self.peek() {
            Some('{') => {
                let body = self.parse_braced()?;
                self.expect_word_end("close-brace")?;
                Ok(vec![Part::Lit(body)])
            }
            Some('"') => {
                self.pos += 1;
                let parts = self.parse_parts(|c| c == '"')?;
                if self.peek() != Some('"') {
                    return Err("missing \"".to_owned());
                }
                self.pos += 1;
                self.expect_word_end("close-quote")?;
                Ok(parts)
            }
            _ => self.parse_parts(|c| c.is_whitespace() || c == ';'),
        }
    }

    fn expect_word_end(&self, what: &str) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(c) if c.is_whitespace() || c == ';' => Ok(()),
            Some(_) => Err(format!("extra characters after {what}")),
        }
    }

    /// Body of a `{...}` word, without the outer braces.
    fn parse_braced(&mut self) -> Result<String, String> {
        self.pos += 1;
        let mut depth = 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => match self.peek() {
                    Some('\n') => {
                        self.pos += 1;
                        while matches!(self.peek(), Some(' ' | '\t')) {
                            self.pos += 1;
                        }
                        out.push(' ');
                    }
                    Some(next) => {
                        self.pos += 1;
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '{' => {
                    depth += 1;
                    out.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        Err("missing close-brace".to_owned())
    }

    /// Parts up to (not including) the first char accepted by `stop`.
    fn parse_parts(&mut self, stop: impl Fn(char) -> bool) -> Result<Word, String> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        while let Some(c) = self.peek() {
            if stop(c) {
                break;
            }
            match c {
                '\\' => {
                    self.pos += 1;
                    lit.push_str(&self.backslash());
                }
                '$' => match self.parse_variable()? {
                    Some(var) => {
                        flush(&mut lit, &mut parts);
                        parts.push(var);
                    }
                    None => lit.push('$'),
                },
                '[' => {
                    flush(&mut lit, &mut parts);
                    parts.push(Part::Cmd(self.parse_bracketed()?));
                }
                _ => {
                    self.pos += 1;
                    lit.push(c);
                }
            }
        }
        flush(&mut lit, &mut parts);
        if parts.is_empty() {
            parts.push(Part::Lit(String::new()));
        }
        Ok(parts)
    }

    /// Escape sequence following a consumed backslash.
    fn backslash(&mut self) -> String {
        let Some(c) = self.peek() else { return "\\".to_owned() };
        self.pos += 1;
        match c {
            'n' => "\n".to_owned(),
            't' => "\t".to_owned(),
            'r' => "\r".to_owned(),
            '\n' => {
                while matches!(self.peek(), Some(' ' | '\t')) {
                    self.pos += 1;
                }
                " ".to_owned()
            }
            other => other.to_string(),
        }
    }

    /// `$name`, `${name}` or `$name(index)`; `None` for a lone `$`.
    fn parse_variable(&mut self) -> Result<Option<Part>, String> {
        self.pos += 1;
        if self.peek() == Some('{') {
            self.pos += 1;
            let mut name = String::new();
            loop {
                match self.peek() {
                    Some('}') => {
                        self.pos += 1;
                        return Ok(Some(Part::Var { name, index: None }));
                    }
                    Some(c) => {
                        name.push(c);
                        self.pos += 1;
                    }
                    None => return Err("missing close-brace for variable name".to_owned()),
                }
            }
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == ':' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Ok(None);
        }
        if self.peek() != Some('(') {
            return Ok(Some(Part::Var { name, index: None }));
        }
        self.pos += 1;
        let index = self.parse_parts(|c| c == ')')?;
        if self.peek() != Some(')') {
            return Err("missing )".to_owned());
        }
        self.pos += 1;
        Ok(Some(Part::Var { name, index: Some(index) }))
    }

    /// Body of a `[...]` substitution, without the brackets.
    fn parse_bracketed(&mut self) -> Result<String, String> {
        self.pos += 1;
        let start = self.pos;
        let mut depth = 1;
        let mut braces = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\\' => self.pos += 1,
                '{' => braces += 1,
                '}' if braces > 0 => braces -= 1,
                '[' if braces == 0 => depth += 1,
                ']' if braces == 0 => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        return Ok(body);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err("missing close-bracket".to_owned())
    }
}

fn flush(lit: &mut String, parts: &mut Vec<Part>) {
    if !lit.is_empty() {
        parts.push(Part::Lit(std::mem::take(lit)));
    }
}

// ── Lists ─────────────────────────────────────────────────────────────────────

/// Split a string in list syntax into its elements.
pub fn split_list(s: &str) -> Result<Vec<String>, String> {
    let chars: Vec<char> = s.chars().collect();
    let mut pos = 0;
    let mut out = Vec::new();
    loop {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos >= chars.len() {
            return Ok(out);
        }
        match chars[pos] {
            '{' => {
                let mut depth = 1;
                let mut elem = String::new();
                pos += 1;
                while pos < chars.len() {
                    let c = chars[pos];
                    pos += 1;
                    match c {
                        '\\' if pos < chars.len() => {
                            elem.push(c);
                            elem.push(chars[pos]);
                            pos += 1;
                            continue;
                        }
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    elem.push(c);
                }
                if depth != 0 {
                    return Err("unmatched open brace in list".to_owned());
                }
                if pos < chars.len() && !chars[pos].is_whitespace() {
                    return Err("list element in braces followed by extra characters".to_owned());
                }
                out.push(elem);
            }
            '"' => {
                let mut elem = String::new();
                pos += 1;
                let mut closed = false;
                while pos < chars.len() {
                    let c = chars[pos];
                    pos += 1;
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' if pos < chars.len() => {
                            elem.push(unescape(chars[pos]));
                            pos += 1;
                        }
                        _ => elem.push(c),
                    }
                }
                if !closed {
                    return Err("unmatched open quote in list".to_owned());
                }
                out.push(elem);
            }
            _ => {
                let mut elem = String::new();
                while pos < chars.len() && !chars[pos].is_whitespace() {
                    let c = chars[pos];
                    pos += 1;
                    if c == '\\' && pos < chars.len() {
                        elem.push(unescape(chars[pos]));
                        pos += 1;
                    } else {
                        elem.push(c);
                    }
                }
                out.push(elem);
            }
        }
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Format one element so [`split_list`] reads it back unchanged.
pub fn format_element(s: &str) -> String {
    if s.is_empty() {
        return "{}".to_owned();
    }
    let special = |c: char| c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '$' | '"' | '\\' | ';');
    if !s.contains(special) && !s.starts_with('#') {
        return s.to_owned();
    }
    if braces_balanced(s) && !s.ends_with('\\') {
        return format!("{{{s}}}");
    }
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if special(c) || c == '#' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn braces_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Join elements into list syntax.
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(|i| format_element(i.as_ref())).collect::<Vec<_>>().join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Part {
        Part::Lit(s.to_owned())
    }

    #[test]
    fn splits_commands_on_newline_and_semicolon() {
        let cmds = parse_script("set a 1; set b 2\nputs $a").unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0], vec![vec![lit("set")], vec![lit("a")], vec![lit("1")]]);
        assert_eq!(cmds[2][1], vec![Part::Var { name: "a".into(), index: None }]);
    }

    #[test]
    fn braces_suppress_substitution() {
        let cmds = parse_script("puts {$a [b] c}").unwrap();
        assert_eq!(cmds[0][1], vec![lit("$a [b] c")]);
    }

    #[test]
    fn nested_braces_kept() {
        let cmds = parse_script("bind . <Configure> {cb {%x %y}}").unwrap();
        assert_eq!(cmds[0][3], vec![lit("cb {%x %y}")]);
    }

    #[test]
    fn quotes_substitute() {
        let cmds = parse_script("puts \"x=$x [y]\"").unwrap();
        assert_eq!(
            cmds[0][1],
            vec![
                lit("x="),
                Part::Var { name: "x".into(), index: None },
                lit(" "),
                Part::Cmd("y".into()),
            ]
        );
    }

    #[test]
    fn array_variable_with_substituted_index() {
        let cmds = parse_script("puts $a($i)").unwrap();
        assert_eq!(
            cmds[0][1],
            vec![Part::Var {
                name: "a".into(),
                index: Some(vec![Part::Var { name: "i".into(), index: None }]),
            }]
        );
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let cmds = parse_script("\n# comment ; still comment\n\nset a 1\n").unwrap();
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn lone_dollar_is_literal() {
        let cmds = parse_script("puts a$").unwrap();
        assert_eq!(cmds[0][1], vec![lit("a$")]);
    }

    #[test]
    fn nested_brackets() {
        let cmds = parse_script("puts [a [b c] {]}]").unwrap();
        assert_eq!(cmds[0][1], vec![Part::Cmd("a [b c] {]}".into())]);
    }

    #[test]
    fn unbalanced_input_is_an_error() {
        assert!(parse_script("puts {abc").is_err());
        assert!(parse_script("puts [abc").is_err());
        assert!(parse_script("puts \"abc").is_err());
        assert!(parse_script("puts {a}b").is_err());
    }

    #[test]
    fn list_split() {
        assert_eq!(split_list("a {b c} \"d e\" f\\ g").unwrap(), vec!["a", "b c", "d e", "f g"]);
        assert_eq!(split_list("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_list("{{100} {item1} {item 2}}").unwrap(), vec!["{100} {item1} {item 2}"]);
        assert!(split_list("{a").is_err());
    }

    #[test]
    fn list_join_reads_back() {
        let items = ["plain", "with space", "", "{brace", "semi;colon"];
        let joined = join_list(&items);
        assert_eq!(split_list(&joined).unwrap(), items);
    }
}
