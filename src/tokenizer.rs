//! Lexes query text into a tree of classified tokens.
//!
//! Lexing produces a flat stream, including whitespace and comments. Grouping
//! then folds it into a tree:
//! - parentheses;
//! - `CASE ... END` blocks;
//! - dotted names;
//! - function calls;
//! - `operand <op> operand` comparisons.
//!
//! The parser only ever sees the grouped tree.

use crate::error::SqlError;
use crate::table::JoinKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    GroupBy,
    OrderBy,
    Into,
    Join(JoinKind),
    On,
    As,
    And,
    Or,
    Case,
    When,
    Then,
    Else,
    End,
    Asc,
    Desc,
    /// SQL keywords outside the supported subset, e.g. HAVING or LIMIT.
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Function,
    Case,
    Comparison,
    Parenthesis,
    Punctuation,
    Whitespace,
    Comment,
    Keyword(Keyword),
    Operator,
    Wildcard,
    Literal,
}

/// A lexed token, or a group of tokens with its children in source order.
///
/// A group's text is the concatenation of its children's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    kind: TokenKind,
    text: String,
    children: Vec<Token>,
}

impl Token {
    fn leaf(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            children: Vec::new(),
        }
    }

    fn group(kind: TokenKind, children: Vec<Token>) -> Self {
        Self {
            kind,
            text: children.iter().map(|child| child.text.as_str()).collect(),
            children,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Token] {
        &self.children
    }

    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_punctuation(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == symbol
    }

    /// True for a comparison operator token such as `=` or `<=`.
    pub fn is_comparison_operator(&self) -> bool {
        self.kind == TokenKind::Operator
            && matches!(
                self.text.as_str(),
                "=" | "==" | "!=" | "<>" | "<" | "<=" | ">" | ">="
            )
    }
}

/// Tokenizes and groups `input`.
pub fn tokenize(input: &str) -> Result<Vec<Token>, SqlError> {
    let flat = Lexer::new(input).tokens()?;
    build_tree(flat)
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn tokens(mut self) -> Result<Vec<Token>, SqlError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek_char(&self, pos: usize) -> Option<char> {
        self.input.get(pos..).and_then(|rest| rest.chars().next())
    }

    fn next_token(&mut self) -> Result<Option<Token>, SqlError> {
        let start = self.pos;
        let Some(ch) = self.peek_char(start) else {
            return Ok(None);
        };
        let rest = &self.input[start..];

        if ch.is_whitespace() {
            let end = self.skip_whitespace(start);
            self.pos = end;
            return Ok(Some(Token::leaf(
                TokenKind::Whitespace,
                &self.input[start..end],
            )));
        }
        if rest.starts_with("--") || rest.starts_with("/*") {
            let end = self.skip_comment(start);
            self.pos = end;
            return Ok(Some(Token::leaf(TokenKind::Comment, &self.input[start..end])));
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let end = self.word_end(start);
            let word = &self.input[start..end];
            self.pos = end;
            return self.lex_word(word).map(Some);
        }

        let starts_number = ch.is_ascii_digit()
            || (ch == '.' && self.peek_char(start + 1).is_some_and(|c| c.is_ascii_digit()));
        if starts_number {
            return Ok(Some(self.lex_number()));
        }

        match ch {
            '\'' => return self.lex_string().map(Some),
            '"' => return self.lex_quoted_ident('"', '"').map(Some),
            '`' => return self.lex_quoted_ident('`', '`').map(Some),
            '[' => return self.lex_quoted_ident('[', ']').map(Some),
            _ => {}
        }

        let two = self.input.get(start..start + 2).unwrap_or("");
        if matches!(two, ">=" | "<=" | "<>" | "!=" | "==") {
            self.pos += 2;
            return Ok(Some(Token::leaf(TokenKind::Operator, two)));
        }

        self.pos += ch.len_utf8();
        let kind = match ch {
            '(' | ')' | ',' | '.' | ';' => TokenKind::Punctuation,
            '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' => TokenKind::Operator,
            _ => {
                return Err(SqlError::parse(format!(
                    "unexpected character '{}'",
                    ch
                )))
            }
        };
        Ok(Some(Token::leaf(kind, ch.to_string())))
    }

    fn word_end(&self, start: usize) -> usize {
        let mut end = start;
        while let Some(c) = self.peek_char(end) {
            if c.is_ascii_alphanumeric() || c == '_' {
                end += c.len_utf8();
            } else {
                break;
            }
        }
        end
    }

    fn skip_whitespace(&self, start: usize) -> usize {
        let mut end = start;
        while let Some(c) = self.peek_char(end) {
            if !c.is_whitespace() {
                break;
            }
            end += c.len_utf8();
        }
        end
    }

    fn skip_comment(&self, start: usize) -> usize {
        let rest = &self.input[start..];
        if rest.starts_with("--") {
            return rest.find('\n').map_or(self.input.len(), |idx| start + idx + 1);
        }
        rest.find("*/").map_or(self.input.len(), |idx| start + idx + 2)
    }

    fn skip_trivia(&self, start: usize) -> usize {
        let mut pos = start;
        while let Some(c) = self.peek_char(pos) {
            let rest = &self.input[pos..];
            if rest.starts_with("--") || rest.starts_with("/*") {
                pos = self.skip_comment(pos);
            } else if c.is_whitespace() {
                pos += c.len_utf8();
            } else {
                break;
            }
        }
        pos
    }

    /// The next word after any whitespace or comments, uppercased, with the
    /// position just past it.
    fn peek_word(&self) -> Option<(String, usize)> {
        let start = self.skip_trivia(self.pos);
        let first = self.peek_char(start)?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let end = self.word_end(start);
        Some((self.input[start..end].to_ascii_uppercase(), end))
    }

    fn lex_word(&mut self, word: &str) -> Result<Token, SqlError> {
        let upper = word.to_ascii_uppercase();
        let keyword = match upper.as_str() {
            "SELECT" => Keyword::Select,
            "FROM" => Keyword::From,
            "WHERE" => Keyword::Where,
            "INTO" => Keyword::Into,
            "ON" => Keyword::On,
            "AS" => Keyword::As,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "CASE" => Keyword::Case,
            "WHEN" => Keyword::When,
            "THEN" => Keyword::Then,
            "ELSE" => Keyword::Else,
            "END" => Keyword::End,
            "ASC" => Keyword::Asc,
            "DESC" => Keyword::Desc,
            "GROUP" | "ORDER" => return self.lex_by_keyword(&upper),
            "JOIN" | "INNER" | "LEFT" | "RIGHT" | "FULL" | "OUTER" => {
                return self.lex_join(&upper)
            }
            "NULL" => return Ok(Token::leaf(TokenKind::Literal, "NULL")),
            _ if is_reserved(&upper) => Keyword::Reserved,
            _ => return Ok(Token::leaf(TokenKind::Identifier, word)),
        };
        Ok(Token::leaf(TokenKind::Keyword(keyword), upper))
    }

    fn lex_by_keyword(&mut self, first: &str) -> Result<Token, SqlError> {
        match self.peek_word() {
            Some((word, end)) if word == "BY" => {
                self.pos = end;
                let keyword = if first == "GROUP" {
                    Keyword::GroupBy
                } else {
                    Keyword::OrderBy
                };
                Ok(Token::leaf(
                    TokenKind::Keyword(keyword),
                    format!("{} BY", first),
                ))
            }
            _ => Err(SqlError::parse(format!("expected BY after {}", first))),
        }
    }

    fn lex_join(&mut self, first: &str) -> Result<Token, SqlError> {
        let mut words = vec![first.to_string()];
        while words.last().is_some_and(|word| word != "JOIN") {
            match self.peek_word() {
                Some((word, end)) if word == "OUTER" || word == "JOIN" => {
                    self.pos = end;
                    words.push(word);
                }
                _ => {
                    return Err(SqlError::parse(format!(
                        "expected JOIN after {}",
                        words.join(" ")
                    )))
                }
            }
        }
        let kind = match first {
            "LEFT" => JoinKind::Left,
            "RIGHT" => JoinKind::Right,
            "FULL" | "OUTER" => JoinKind::Outer,
            _ => JoinKind::Inner,
        };
        Ok(Token::leaf(
            TokenKind::Keyword(Keyword::Join(kind)),
            words.join(" "),
        ))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        let mut saw_dot = false;
        let mut end = start;
        while let Some(c) = self.peek_char(end) {
            if c.is_ascii_digit() {
                end += 1;
            } else if c == '.' && !saw_dot {
                saw_dot = true;
                end += 1;
            } else if (c == 'e' || c == 'E') && end > start {
                let mut exp_end = end + 1;
                if matches!(self.peek_char(exp_end), Some('+' | '-')) {
                    exp_end += 1;
                }
                if !self.peek_char(exp_end).is_some_and(|d| d.is_ascii_digit()) {
                    break;
                }
                end = exp_end;
                while self.peek_char(end).is_some_and(|d| d.is_ascii_digit()) {
                    end += 1;
                }
                break;
            } else {
                break;
            }
        }
        self.pos = end;
        Token::leaf(TokenKind::Literal, &self.input[start..end])
    }

    /// Lexes a single-quoted string. The token keeps its quotes so the
    /// surface text can name the literal.
    fn lex_string(&mut self) -> Result<Token, SqlError> {
        let start = self.pos;
        let mut pos = start + 1;
        while let Some(c) = self.peek_char(pos) {
            pos += c.len_utf8();
            if c == '\'' {
                if self.peek_char(pos) == Some('\'') {
                    pos += 1;
                } else {
                    self.pos = pos;
                    return Ok(Token::leaf(TokenKind::Literal, &self.input[start..pos]));
                }
            }
        }
        Err(SqlError::parse("unterminated string literal"))
    }

    fn lex_quoted_ident(&mut self, open: char, close: char) -> Result<Token, SqlError> {
        self.pos += open.len_utf8();
        let mut value = String::new();
        while let Some(c) = self.peek_char(self.pos) {
            if c == close {
                if open == close && self.peek_char(self.pos + close.len_utf8()) == Some(close) {
                    value.push(close);
                    self.pos += 2 * close.len_utf8();
                } else {
                    self.pos += close.len_utf8();
                    return Ok(Token::leaf(TokenKind::Identifier, value));
                }
            } else {
                value.push(c);
                self.pos += c.len_utf8();
            }
        }
        Err(SqlError::parse("unterminated quoted identifier"))
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "HAVING"
            | "LIMIT"
            | "OFFSET"
            | "UNION"
            | "INTERSECT"
            | "EXCEPT"
            | "DISTINCT"
            | "ALL"
            | "INSERT"
            | "UPDATE"
            | "DELETE"
            | "CREATE"
            | "DROP"
            | "ALTER"
            | "VALUES"
            | "SET"
            | "WITH"
            | "CROSS"
            | "NATURAL"
            | "USING"
            | "NOT"
            | "IN"
            | "IS"
            | "LIKE"
            | "BETWEEN"
            | "EXISTS"
            | "CAST"
    )
}

fn build_tree(flat: Vec<Token>) -> Result<Vec<Token>, SqlError> {
    let mut stack: Vec<Vec<Token>> = vec![Vec::new()];
    for token in flat {
        if token.is_punctuation("(") {
            stack.push(vec![token]);
        } else if token.is_punctuation(")") {
            if stack.len() < 2 {
                return Err(SqlError::parse("unbalanced parentheses: unexpected ')'"));
            }
            let Some(mut inner) = stack.pop() else {
                return Err(SqlError::parse("unbalanced parentheses: unexpected ')'"));
            };
            let open = inner.remove(0);
            let mut children = vec![open];
            children.extend(group_level(inner));
            children.push(token);
            if let Some(parent) = stack.last_mut() {
                parent.push(Token::group(TokenKind::Parenthesis, children));
            }
        } else if let Some(level) = stack.last_mut() {
            level.push(token);
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(top), true) => Ok(group_level(top)),
        _ => Err(SqlError::parse("unbalanced parentheses: missing ')'")),
    }
}

/// Groups one nesting level. Parenthesized children were grouped when their
/// parenthesis closed.
fn group_level(tokens: Vec<Token>) -> Vec<Token> {
    let tokens = group_cases(tokens);
    let tokens = group_identifiers(tokens);
    let tokens = group_functions(tokens);
    let tokens = classify_operators(tokens);
    group_comparisons(tokens)
}

fn group_cases(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        if !token.is_keyword(Keyword::Case) {
            out.push(token);
            continue;
        }
        let mut body = Vec::new();
        let mut depth = 1usize;
        let mut end = None;
        for next in iter.by_ref() {
            if next.is_keyword(Keyword::Case) {
                depth += 1;
            } else if next.is_keyword(Keyword::End) {
                depth -= 1;
                if depth == 0 {
                    end = Some(next);
                    break;
                }
            }
            body.push(next);
        }
        match end {
            Some(end) => {
                let mut children = vec![token];
                children.extend(group_level(body));
                children.push(end);
                out.push(Token::group(TokenKind::Case, children));
            }
            // Unterminated; the parser reports it.
            None => {
                out.push(token);
                out.extend(body);
            }
        }
    }
    out
}

fn group_identifiers(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        let joins_previous = token.is_punctuation(".")
            && out.last().is_some_and(|t| t.kind == TokenKind::Identifier)
            && iter.peek().is_some_and(|t| t.kind == TokenKind::Identifier);
        if !joins_previous {
            out.push(token);
            continue;
        }
        let (Some(left), Some(right)) = (out.pop(), iter.next()) else {
            continue;
        };
        let mut children = if left.is_group() {
            left.children
        } else {
            vec![left]
        };
        children.push(token);
        children.push(right);
        out.push(Token::group(TokenKind::Identifier, children));
    }
    out
}

fn group_functions(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let is_call = token.kind == TokenKind::Parenthesis
            && out
                .last()
                .is_some_and(|t| t.kind == TokenKind::Identifier && !t.is_group());
        match out.pop() {
            Some(name) if is_call => {
                out.push(Token::group(TokenKind::Function, vec![name, token]));
            }
            previous => {
                out.extend(previous);
                out.push(token);
            }
        }
    }
    out
}

fn is_operand(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Literal
            | TokenKind::Function
            | TokenKind::Parenthesis
            | TokenKind::Case
            | TokenKind::Wildcard
    )
}

/// Turns `*` into a wildcard unless it follows an operand, and folds a minus
/// sign into the numeric literal right after it when nothing precedes the
/// sign as an operand.
fn classify_operators(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(mut token) = iter.next() {
        let after_operand = out
            .iter()
            .rev()
            .find(|t| !t.is_trivia())
            .is_some_and(|t| is_operand(t.kind));
        if token.kind == TokenKind::Operator && !after_operand {
            if token.text == "*" {
                token.kind = TokenKind::Wildcard;
            } else if token.text == "-" {
                let negates_number = iter.peek().is_some_and(|next| {
                    next.kind == TokenKind::Literal
                        && next.text.starts_with(|c: char| c.is_ascii_digit() || c == '.')
                });
                if negates_number {
                    if let Some(number) = iter.next() {
                        out.push(Token::leaf(
                            TokenKind::Literal,
                            format!("-{}", number.text),
                        ));
                        continue;
                    }
                }
            }
        }
        out.push(token);
    }
    out
}

fn group_comparisons(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if !token.is_comparison_operator() {
            out.push(token);
            continue;
        }
        let left = out.iter().rposition(|t| !t.is_trivia());
        let left_is_operand = left.is_some_and(|pos| is_operand(out[pos].kind));
        let mut between = Vec::new();
        while let Some(next) = iter.next_if(|t| t.is_trivia()) {
            between.push(next);
        }
        let right_is_operand = iter.peek().is_some_and(|t| is_operand(t.kind));
        match left {
            Some(pos) if left_is_operand && right_is_operand => {
                let mut children = out.split_off(pos);
                children.push(token);
                children.extend(between);
                children.extend(iter.next());
                out.push(Token::group(TokenKind::Comparison, children));
            }
            _ => {
                out.push(token);
                out.extend(between);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(tokens: &[Token]) -> Vec<&Token> {
        tokens.iter().filter(|t| !t.is_trivia()).collect()
    }

    #[test]
    fn merges_multi_word_keywords() {
        let tokens = tokenize("group  by x ORDER\nBY y left outer join z").unwrap();
        let kinds: Vec<TokenKind> = significant(&tokens).iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::GroupBy),
                TokenKind::Identifier,
                TokenKind::Keyword(Keyword::OrderBy),
                TokenKind::Identifier,
                TokenKind::Keyword(Keyword::Join(JoinKind::Left)),
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn groups_comparison_of_dotted_names() {
        let tokens = tokenize("t.a >= -3").unwrap();
        let tokens = significant(&tokens);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind(), TokenKind::Comparison);
        let parts = significant(tokens[0].children());
        assert_eq!(parts[0].kind(), TokenKind::Identifier);
        assert_eq!(parts[0].text(), "t.a");
        assert_eq!(parts[2].text(), "-3");
    }

    #[test]
    fn star_is_wildcard_only_in_operand_position() {
        let tokens = tokenize("SELECT * FROM t").unwrap();
        assert_eq!(significant(&tokens)[1].kind(), TokenKind::Wildcard);
        let tokens = tokenize("a * 2").unwrap();
        assert_eq!(significant(&tokens)[1].kind(), TokenKind::Operator);
    }

    #[test]
    fn unbalanced_parentheses_fail() {
        assert!(tokenize("SELECT (a FROM t").is_err());
        assert!(tokenize("SELECT a) FROM t").is_err());
    }
}
