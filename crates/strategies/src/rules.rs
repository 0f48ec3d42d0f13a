//! The boolean rule language that trading rules are written in.
//!
//! A condition like `"RSI.oversold AND NOT MACD.bearish"` is parsed once,
//! at strategy construction, into a [`RuleExpr`] tree. Evaluation is then a
//! plain tree walk over a [`FactSet`]; a malformed condition is a
//! configuration error surfaced at startup, never at trade time.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ("OR" and)*
//! and     := unary ("AND" unary)*
//! unary   := "NOT" unary | primary
//! primary := "(" expr ")" | fact
//! fact    := identifier, dots allowed (e.g. RSI.oversold)
//! ```

use crate::error::StrategyError;
use crate::facts::FactSet;

/// A parsed rule condition.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr {
    Fact(String),
    Not(Box<RuleExpr>),
    And(Box<RuleExpr>, Box<RuleExpr>),
    Or(Box<RuleExpr>, Box<RuleExpr>),
}

impl RuleExpr {
    pub fn parse(condition: &str) -> Result<Self, StrategyError> {
        let tokens = tokenize(condition).map_err(|message| StrategyError::RuleParse {
            condition: condition.to_string(),
            message,
        })?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
        };
        let expr = parser.expr().map_err(|message| StrategyError::RuleParse {
            condition: condition.to_string(),
            message,
        })?;
        if parser.pos != tokens.len() {
            return Err(StrategyError::RuleParse {
                condition: condition.to_string(),
                message: format!("unexpected trailing input at token {}", parser.pos + 1),
            });
        }
        Ok(expr)
    }

    /// Evaluates the expression against the current facts. A fact the
    /// engine does not know evaluates to `false`.
    pub fn evaluate(&self, facts: &FactSet) -> bool {
        match self {
            RuleExpr::Fact(name) => facts.is_true(name),
            RuleExpr::Not(inner) => !inner.evaluate(facts),
            RuleExpr::And(a, b) => a.evaluate(facts) && b.evaluate(facts),
            RuleExpr::Or(a, b) => a.evaluate(facts) || b.evaluate(facts),
        }
    }

    /// Every fact name the expression references.
    pub fn fact_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_facts(&mut names);
        names
    }

    fn collect_facts<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            RuleExpr::Fact(name) => names.push(name),
            RuleExpr::Not(inner) => inner.collect_facts(names),
            RuleExpr::And(a, b) | RuleExpr::Or(a, b) => {
                a.collect_facts(names);
                b.collect_facts(names);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Fact(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Fact(word),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    if tokens.is_empty() {
        return Err("empty condition".to_string());
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expr(&mut self) -> Result<RuleExpr, String> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = RuleExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<RuleExpr, String> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.unary()?;
            left = RuleExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<RuleExpr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(RuleExpr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<RuleExpr, String> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err("missing closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Fact(name)) => {
                let expr = RuleExpr::Fact(name.clone());
                self.pos += 1;
                Ok(expr)
            }
            Some(token) => Err(format!("expected a fact or '(', found {token:?}")),
            None => Err("unexpected end of condition".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(truths: &[&str]) -> FactSet {
        let mut set = FactSet::default();
        for name in truths {
            set.set(name, true);
        }
        set
    }

    #[test]
    fn single_fact() {
        let expr = RuleExpr::parse("RSI.oversold").unwrap();
        assert!(expr.evaluate(&facts(&["RSI.oversold"])));
        assert!(!expr.evaluate(&facts(&[])));
    }

    #[test]
    fn and_requires_both() {
        let expr = RuleExpr::parse("RSI.oversold AND MACD.bullish").unwrap();
        assert!(expr.evaluate(&facts(&["RSI.oversold", "MACD.bullish"])));
        assert!(!expr.evaluate(&facts(&["RSI.oversold"])));
    }

    #[test]
    fn or_accepts_either() {
        let expr = RuleExpr::parse("RSI.oversold OR MACD.bullish").unwrap();
        assert!(expr.evaluate(&facts(&["MACD.bullish"])));
        assert!(!expr.evaluate(&facts(&[])));
    }

    #[test]
    fn not_inverts() {
        let expr = RuleExpr::parse("NOT MACD.bearish").unwrap();
        assert!(expr.evaluate(&facts(&[])));
        assert!(!expr.evaluate(&facts(&["MACD.bearish"])));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // a OR b AND c  ==  a OR (b AND c)
        let expr = RuleExpr::parse("a OR b AND c").unwrap();
        assert!(expr.evaluate(&facts(&["a"])));
        assert!(expr.evaluate(&facts(&["b", "c"])));
        assert!(!expr.evaluate(&facts(&["b"])));
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = RuleExpr::parse("(a OR b) AND c").unwrap();
        assert!(expr.evaluate(&facts(&["a", "c"])));
        assert!(!expr.evaluate(&facts(&["a"])));
    }

    #[test]
    fn not_applies_to_the_nearest_term() {
        let expr = RuleExpr::parse("NOT a AND b").unwrap();
        assert!(expr.evaluate(&facts(&["b"])));
        assert!(!expr.evaluate(&facts(&["a", "b"])));
    }

    #[test]
    fn unknown_facts_evaluate_false() {
        let expr = RuleExpr::parse("something.unheard_of").unwrap();
        assert!(!expr.evaluate(&facts(&["RSI.oversold"])));
    }

    #[test]
    fn malformed_conditions_fail_to_parse() {
        assert!(RuleExpr::parse("").is_err());
        assert!(RuleExpr::parse("AND RSI.oversold").is_err());
        assert!(RuleExpr::parse("(RSI.oversold").is_err());
        assert!(RuleExpr::parse("RSI.oversold MACD.bullish").is_err());
        assert!(RuleExpr::parse("RSI.oversold AND").is_err());
        assert!(RuleExpr::parse("a && b").is_err());
    }

    #[test]
    fn fact_names_are_collected() {
        let expr = RuleExpr::parse("a AND (b OR NOT c)").unwrap();
        assert_eq!(expr.fact_names(), vec!["a", "b", "c"]);
    }
}
