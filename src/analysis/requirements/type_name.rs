//! Reflection type name parsing.
//!
//! Strings handed to `Type.GetType` and similar APIs use the reflection type name
//! grammar: a namespace-qualified name with `+` separating nested types, optional generic
//! arguments in brackets, optional array/pointer/by-ref suffixes, and an optional assembly
//! qualification after a comma:
//!
//! ```text
//! App.Outer+Inner
//! System.Collections.Generic.List`1[[App.Foo, App]], System.Private.CoreLib
//! App.Foo[], App
//! ```
//!
//! Suffixes are parsed and dropped: an array of a type keeps the element type's members
//! reachable, which is what resolving the name is used for.

/// A parsed reflection type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    /// Full name of the (generic definition) type, `Ns.Outer+Inner`
    pub name: String,
    /// Simple name of the qualifying assembly
    pub assembly: Option<String>,
    /// Generic arguments
    pub generic_args: Vec<TypeName>,
}

impl TypeName {
    /// Parses a type name; returns `None` for text that is not a well-formed name.
    #[must_use]
    pub fn parse(text: &str) -> Option<TypeName> {
        let mut parser = Parser {
            chars: text.chars().collect(),
            pos: 0,
        };
        let name = parser.qualified(Terminator::End)?;
        parser.skip_whitespace();
        parser.at_end().then_some(name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Bracket,
    ArgumentList,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Option<()> {
        self.skip_whitespace();
        (self.peek() == Some(expected)).then(|| self.pos += 1)
    }

    fn qualified(&mut self, terminator: Terminator) -> Option<TypeName> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '\\' => self.pos += 2,
                '[' | ']' | ',' | '*' | '&' => break,
                _ => self.pos += 1,
            }
        }
        let end = self.pos.min(self.chars.len());
        let name: String = self.chars[start..end].iter().collect::<String>().trim().to_string();
        if name.is_empty() {
            return None;
        }

        let mut generic_args = Vec::new();
        if self.peek() == Some('[') && !matches!(self.peek_second(), Some(']' | ',' | '*')) {
            self.pos += 1;
            loop {
                self.skip_whitespace();
                let arg = if self.peek() == Some('[') {
                    self.pos += 1;
                    let arg = self.qualified(Terminator::Bracket)?;
                    self.expect(']')?;
                    arg
                } else {
                    self.qualified(Terminator::ArgumentList)?
                };
                generic_args.push(arg);
                self.skip_whitespace();
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some(']') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return None,
                }
            }
        }

        self.suffixes()?;

        let mut assembly = None;
        self.skip_whitespace();
        if terminator != Terminator::ArgumentList && self.peek() == Some(',') {
            self.pos += 1;
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c == ']' && terminator == Terminator::Bracket {
                    break;
                }
                self.pos += 1;
            }
            let qualification: String = self.chars[start..self.pos].iter().collect();
            let simple = qualification.split(',').next().unwrap_or_default().trim();
            if simple.is_empty() {
                return None;
            }
            assembly = Some(simple.to_string());
        }

        Some(TypeName {
            name,
            assembly,
            generic_args,
        })
    }

    fn suffixes(&mut self) -> Option<()> {
        loop {
            match self.peek() {
                Some('*' | '&') => self.pos += 1,
                Some('[') => {
                    self.pos += 1;
                    while matches!(self.peek(), Some(',' | '*' | ' ')) {
                        self.pos += 1;
                    }
                    self.expect(']')?;
                }
                _ => return Some(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(name: &str, assembly: Option<&str>) -> TypeName {
        TypeName {
            name: name.to_string(),
            assembly: assembly.map(str::to_string),
            generic_args: Vec::new(),
        }
    }

    #[test]
    fn plain_and_nested() {
        assert_eq!(TypeName::parse("App.Foo"), Some(simple("App.Foo", None)));
        assert_eq!(
            TypeName::parse(" App.Outer+Inner "),
            Some(simple("App.Outer+Inner", None))
        );
    }

    #[test]
    fn assembly_qualified() {
        assert_eq!(
            TypeName::parse("App.Foo, App, Version=1.0.0.0, Culture=neutral"),
            Some(simple("App.Foo", Some("App")))
        );
    }

    #[test]
    fn generic_arguments() {
        let parsed =
            TypeName::parse("System.Collections.Generic.List`1[[App.Foo, App]], System.Runtime")
                .unwrap();
        assert_eq!(parsed.name, "System.Collections.Generic.List`1");
        assert_eq!(parsed.assembly.as_deref(), Some("System.Runtime"));
        assert_eq!(parsed.generic_args, vec![simple("App.Foo", Some("App"))]);

        let bare = TypeName::parse("App.Pair`2[App.A,App.B]").unwrap();
        assert_eq!(
            bare.generic_args,
            vec![simple("App.A", None), simple("App.B", None)]
        );
    }

    #[test]
    fn suffixes_are_dropped() {
        assert_eq!(TypeName::parse("App.Foo[]"), Some(simple("App.Foo", None)));
        assert_eq!(TypeName::parse("App.Foo[,]&"), Some(simple("App.Foo", None)));
    }

    #[test]
    fn malformed() {
        assert_eq!(TypeName::parse(""), None);
        assert_eq!(TypeName::parse("App.Foo[[App.Bar"), None);
        assert_eq!(TypeName::parse("App.Foo, "), None);
    }
}
