//! Placeholder dialect rewriting.
//!
//! Queries arrive in one of five placeholder dialects and are normalized
//! to the `$N` form the backend understands, together with a materializer
//! that projects the caller's values into positional order.
use std::collections::HashMap;

use crate::{error::Error, types::Value};

/// The placeholder dialect of an input query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamStyle {
    /// `?` positional.
    Qmark,
    /// `:N` positional by number. `::` casts and `:=` are preserved.
    Numeric,
    /// `:name` named, deduplicated across the query.
    Named,
    /// `%s` positional, `%%` escapes a literal percent.
    #[default]
    Format,
    /// `%(name)s` named. Demotes to [`Format`][ParamStyle::Format] when a
    /// bare `%` conversion is seen.
    PyFormat,
}

impl ParamStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qmark => "qmark",
            Self::Numeric => "numeric",
            Self::Named => "named",
            Self::Format => "format",
            Self::PyFormat => "pyformat",
        }
    }
}

impl std::str::FromStr for ParamStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "qmark" => Self::Qmark,
            "numeric" => Self::Numeric,
            "named" => Self::Named,
            "format" => Self::Format,
            "pyformat" => Self::PyFormat,
            other => return Err(Error::Programming(format!("unknown paramstyle {other:?}").into())),
        })
    }
}

/// Query parameter values, positional or named depending on the dialect.
#[derive(Debug, Clone, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Params {
    fn from(values: [V; N]) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<Vec<V>> for Params {
    fn from(values: Vec<V>) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::Named(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Projects caller values into the positional order of the normalized
/// query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Materializer {
    /// Positional dialects bind values as given.
    Positional,
    /// Named dialects emit values in the order of the deduplicated
    /// placeholder list.
    Named(Vec<String>),
}

impl Materializer {
    pub(crate) fn make_args(&self, params: &Params) -> Result<Vec<Value>, Error> {
        match (self, params) {
            (Self::Positional, Params::None) => Ok(Vec::new()),
            (Self::Positional, Params::Positional(values)) => Ok(values.clone()),
            (Self::Positional, Params::Named(_)) => Err(Error::Programming(
                "positional paramstyle requires a sequence of values".into(),
            )),
            (Self::Named(names), Params::Named(values)) => names
                .iter()
                .map(|name| {
                    values.get(name).cloned().ok_or_else(|| {
                        Error::Programming(format!("missing value for placeholder {name:?}").into())
                    })
                })
                .collect(),
            (Self::Named(names), Params::None) if names.is_empty() => Ok(Vec::new()),
            (Self::Named(_), _) => Err(Error::Programming(
                "named paramstyle requires a mapping of values".into(),
            )),
        }
    }
}

// Scanner states. Transitions honor doubled single quotes, backslash
// escapes inside E'...', and `--` line comments.
#[derive(PartialEq)]
enum State {
    Outside,
    InsideSingleQuote,
    InsideQuotedIdent,
    InsideEscapedString,
    InsideParamName,
    InsideLineComment,
}

/// Rewrite `query` from `style` into the `$N` form.
///
/// Returns the normalized query and the argument materializer.
pub(crate) fn convert(style: ParamStyle, query: &str) -> Result<(String, Materializer), Error> {
    use State::*;

    let mut style = style;
    let chars: Vec<char> = query.chars().collect();

    let mut in_quote_escape = false;
    let mut in_param_escape = false;
    let mut placeholders: Vec<String> = Vec::new();
    let mut output = String::with_capacity(query.len());
    let mut param_idx = 1usize;
    let mut state = Outside;
    let mut prev_c: Option<char> = None;

    let mut next_param = |output: &mut String, param_idx: &mut usize| {
        output.push('$');
        output.push_str(itoa::Buffer::new().format(*param_idx));
        *param_idx += 1;
    };

    for (i, &c) in chars.iter().enumerate() {
        let next_c = chars.get(i + 1).copied();

        match state {
            Outside => {
                if c == '\'' {
                    output.push(c);
                    state = if prev_c == Some('E') { InsideEscapedString } else { InsideSingleQuote };
                } else if c == '"' {
                    output.push(c);
                    state = InsideQuotedIdent;
                } else if c == '-' {
                    output.push(c);
                    if prev_c == Some('-') {
                        state = InsideLineComment;
                    }
                } else if style == ParamStyle::Qmark && c == '?' {
                    next_param(&mut output, &mut param_idx);
                } else if style == ParamStyle::Numeric
                    && c == ':'
                    && !matches!(next_c, Some(':' | '='))
                    && prev_c != Some(':')
                {
                    // Treat : as the beginning of a parameter number only
                    // if it is the only : around, so sum(x)::float and
                    // x := 1 pass through untouched.
                    output.push('$');
                } else if style == ParamStyle::Named
                    && c == ':'
                    && !matches!(next_c, Some(':' | '='))
                    && prev_c != Some(':')
                {
                    state = InsideParamName;
                    placeholders.push(String::new());
                } else if style == ParamStyle::PyFormat && c == '%' && next_c == Some('(') {
                    state = InsideParamName;
                    placeholders.push(String::new());
                } else if matches!(style, ParamStyle::Format | ParamStyle::PyFormat) && c == '%' {
                    // a bare % conversion demotes pyformat to format
                    style = ParamStyle::Format;
                    if in_param_escape {
                        in_param_escape = false;
                        output.push(c);
                    } else if next_c == Some('%') {
                        in_param_escape = true;
                    } else if next_c == Some('s') {
                        state = InsideParamName;
                        next_param(&mut output, &mut param_idx);
                    } else {
                        return Err(Error::Interface(
                            "Only %s and %% are supported in the query.".into(),
                        ));
                    }
                } else {
                    output.push(c);
                }
            }

            InsideSingleQuote => {
                if c == '\'' {
                    if in_quote_escape {
                        in_quote_escape = false;
                    } else if next_c == Some('\'') {
                        in_quote_escape = true;
                    } else {
                        state = Outside;
                    }
                }
                output.push(c);
            }

            InsideQuotedIdent => {
                if c == '"' {
                    state = Outside;
                }
                output.push(c);
            }

            InsideEscapedString => {
                if c == '\'' && prev_c != Some('\\') {
                    state = Outside;
                }
                output.push(c);
            }

            InsideParamName => match style {
                ParamStyle::Named => {
                    let name = placeholders.last_mut().expect("pushed on state entry");
                    name.push(c);
                    if next_c.is_none_or(|n| !n.is_alphanumeric() && n != '_') {
                        state = Outside;
                        let name = placeholders.last().unwrap().clone();
                        match placeholders[..placeholders.len() - 1]
                            .iter()
                            .position(|p| *p == name)
                        {
                            Some(pidx) => {
                                output.push('$');
                                output.push_str(itoa::Buffer::new().format(pidx + 1));
                                placeholders.pop();
                            }
                            None => {
                                output.push('$');
                                output.push_str(itoa::Buffer::new().format(placeholders.len()));
                            }
                        }
                    }
                }
                ParamStyle::PyFormat => {
                    if prev_c == Some(')') && c == 's' {
                        state = Outside;
                        let name = placeholders.last().unwrap().clone();
                        match placeholders[..placeholders.len() - 1]
                            .iter()
                            .position(|p| *p == name)
                        {
                            Some(pidx) => {
                                output.push('$');
                                output.push_str(itoa::Buffer::new().format(pidx + 1));
                                placeholders.pop();
                            }
                            None => {
                                output.push('$');
                                output.push_str(itoa::Buffer::new().format(placeholders.len()));
                            }
                        }
                    } else if matches!(c, '(' | ')') {
                        // delimiter, not part of the name
                    } else {
                        placeholders.last_mut().expect("pushed on state entry").push(c);
                    }
                }
                // format: the 's' conversion character was consumed
                _ => state = Outside,
            },

            InsideLineComment => {
                output.push(c);
                if c == '\n' {
                    state = Outside;
                }
            }
        }

        prev_c = Some(c);
    }

    let materializer = match style {
        ParamStyle::Qmark | ParamStyle::Numeric | ParamStyle::Format => Materializer::Positional,
        ParamStyle::Named | ParamStyle::PyFormat => Materializer::Named(placeholders),
    };
    Ok((output, materializer))
}
