//! Tokenize and parse object text.
//!
//! ```text
//! document := (object | field ';')*
//! object   := name '{' (object | field ';')* '}'
//! field    := name ':' value
//! ```

use crate::{Error, Object, Value};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    /// One of `{`, `}`, `:` or `;`.
    Symbol(char),
    /// A bare word (name or unquoted value).
    Word(String),
    /// A quoted string with escapes resolved.
    Quoted(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Symbol(c) => c.to_string(),
            Self::Word(word) => word.clone(),
            Self::Quoted(text) => format!("\"{text}\""),
        }
    }
}

fn is_symbol(c: char) -> bool {
    matches!(c, '{' | '}' | ':' | ';')
}

/// Splits `input` on whitespace and around symbols (outside of quotes).
fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() || c == '\0' {
            chars.next();
        } else if is_symbol(c) {
            tokens.push(Token::Symbol(c));
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, escaped)) => text.push(escaped),
                        None => break,
                    },
                    c => text.push(c),
                }
            }
            if !closed {
                return Err(Error::UnterminatedString(start));
            }
            tokens.push(Token::Quoted(text));
        } else {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_whitespace() || c == '\0' || is_symbol(c) || c == '"' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

/// Position of the parser within the grammar.
enum State {
    SeekingName,
    SeekingType(String),
    SeekingValue(String),
    SeekingEnd,
}

/// Parses `input` into a root [Object].
pub fn parse(input: &str) -> Result<Object, Error> {
    let tokens = tokenize(input)?;

    // Path from the root to the object currently being filled
    let mut root = Object::new();
    let mut scope: Vec<String> = Vec::new();
    let mut state = State::SeekingName;
    for (position, token) in tokens.into_iter().enumerate() {
        let current = scope
            .iter()
            .fold(&mut root, |object, name| object.object_mut(name));
        state = match (state, token) {
            (State::SeekingName, Token::Symbol('}')) => {
                if scope.pop().is_none() {
                    return Err(Error::UnbalancedBrace(position));
                }
                State::SeekingName
            }
            (State::SeekingName, Token::Word(name)) => State::SeekingType(name),
            (State::SeekingType(name), Token::Symbol(':')) => State::SeekingValue(name),
            (State::SeekingType(name), Token::Symbol('{')) => {
                current.object_mut(&name);
                scope.push(name);
                State::SeekingName
            }
            (State::SeekingValue(name), Token::Word(word)) => {
                current.set_field(&name, Value::infer(&word));
                State::SeekingEnd
            }
            (State::SeekingValue(name), Token::Quoted(text)) => {
                current.set_field(&name, Value::Text(text));
                State::SeekingEnd
            }
            (State::SeekingEnd, Token::Symbol(';')) => State::SeekingName,
            (_, token) => return Err(Error::UnexpectedToken(token.describe(), position)),
        };
    }

    match state {
        State::SeekingName if scope.is_empty() => Ok(root),
        _ => Err(Error::UnexpectedEnd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("end{status:\"O K\";}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("end".into()),
                Token::Symbol('{'),
                Token::Word("status".into()),
                Token::Symbol(':'),
                Token::Quoted("O K".into()),
                Token::Symbol(';'),
                Token::Symbol('}'),
            ]
        );
    }

    #[test]
    fn test_parse_exchange() {
        let root = parse("exchange{base:263;prime:4294967291;}").unwrap();
        let exchange = root.object("exchange").unwrap();
        assert_eq!(exchange.field("base"), Some(&Value::Integer(263)));
        assert_eq!(exchange.field("prime"), Some(&Value::Integer(4_294_967_291)));
    }

    #[test]
    fn test_parse_whitespace_and_nesting() {
        let input = "
            network {
                timeout: 5000;
                encryption: true;
                limits { max_clients: 16; }
            }
            name: \"parley\";
        ";
        let root = parse(input).unwrap();
        let network = root.object("network").unwrap();
        assert_eq!(network.field("timeout"), Some(&Value::Integer(5000)));
        assert_eq!(network.field("encryption"), Some(&Value::Bool(true)));
        assert_eq!(
            network.object("limits").unwrap().field("max_clients"),
            Some(&Value::Integer(16))
        );
        assert_eq!(root.field("name"), Some(&Value::Text("parley".into())));
    }

    #[test]
    fn test_parse_escapes() {
        let root = parse(r#"m{s:"a\"b\\c";}"#).unwrap();
        assert_eq!(
            root.object("m").unwrap().field("s"),
            Some(&Value::Text("a\"b\\c".into()))
        );
    }

    #[test]
    fn test_parse_round_trip_encoding() {
        let object = Object::new().with("key", 17i64).with("note", "x;y{z}");
        let encoded = object.encode("exchange");
        let root = parse(&encoded).unwrap();
        assert_eq!(root.object("exchange"), Some(&object));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("PING"), Err(Error::UnexpectedEnd)));
        assert!(matches!(parse("a{b:1}"), Err(Error::UnexpectedToken(t, 5)) if t == "}"));
        assert!(matches!(parse("a{b:1;"), Err(Error::UnexpectedEnd)));
        assert!(matches!(parse("}"), Err(Error::UnbalancedBrace(0))));
        assert!(matches!(parse("a{b:\"x;}"), Err(Error::UnterminatedString(4))));
        assert!(matches!(parse("a{:1;}"), Err(Error::UnexpectedToken(t, 2)) if t == ":"));
        assert!(matches!(parse("hello world"), Err(Error::UnexpectedToken(t, 1)) if t == "world"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  \0\0").unwrap().is_empty());
    }
}
