use chumsky::{prelude::*, text::whitespace};

use crate::index::Value;

use super::{Logical, Operator, Query, QueryPart};

pub fn compile_query(query: &str) -> Result<Query, Vec<Rich<'_, char>>> {
    let p = parser();
    p.parse(query).into_result()
}

/// Parse a number matched by the number grammar below. Integers are kept as
/// integers if `keep_integers` is set.
fn parse_number(s: &str, keep_integers: bool) -> Result<Value, std::num::ParseFloatError> {
    if keep_integers {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(i.into());
        }
    }
    s.parse::<f64>().map(Into::into)
}

fn parser<'a>() -> impl Parser<'a, &'a str, Query, extra::Err<Rich<'a, char>>> {
    recursive(|query_parts| {
        let string = any()
            .filter(|c: &char| !c.is_whitespace() && *c != ')')
            .repeated()
            .at_least(1)
            .collect();

        let double_quoted_string = choice((just("\\\"").to('"'), none_of('"')))
            .repeated()
            .collect()
            .delimited_by(just('"'), just('"'));

        let single_quoted_string = choice((just("\\'").to('\''), none_of('\'')))
            .repeated()
            .collect()
            .delimited_by(just('\''), just('\''));

        let frac_with_digits = just('.').then(text::digits(10));

        let frac_with_optional_digits = just('.').then(text::digits(10).or_not());

        let exp = one_of("eE")
            .then(one_of("+-").or_not())
            .then(text::digits(10));

        let number = one_of("+-")
            .or_not()
            .then(choice((
                frac_with_digits.to_slice(),
                text::int(10)
                    .then(frac_with_optional_digits.or_not())
                    .to_slice(),
            )))
            .then(exp.or_not());

        // strings starting with numbers are also valid, so we must make sure
        // the number is followed by a whitespace, a closing parenthesis,
        // or that it's the last element
        let number_value = number
            .then_ignore(choice((whitespace().exactly(1), just(')').ignored(), end())).rewind())
            .to_slice();

        let logical = |name: &'static str, f: fn(Vec<QueryPart>) -> Logical| {
            just(name).ignore_then(whitespace()).ignore_then(
                query_parts
                    .clone()
                    .delimited_by(just('('), just(')'))
                    .map(move |a| QueryPart::Logical(f(a))),
            )
        };

        let key_value = choice((double_quoted_string, single_quoted_string, string))
            .then_ignore(whitespace().at_least(1))
            .then(choice((
                double_quoted_string.map(|a: String| a.into()),
                single_quoted_string.map(|a: String| a.into()),
                number_value.try_map(|a: &str, span| {
                    parse_number(a, true).map_err(|e| Rich::custom(span, e))
                }),
                string.map(|a: String| a.into()),
            )))
            .padded();

        let comparison = |name: &'static str, operator: Operator| {
            just(name).ignore_then(whitespace()).ignore_then(
                key_value
                    .clone()
                    .delimited_by(just('('), just(')'))
                    .map(move |(key, value): (String, Value)| QueryPart::Comparison {
                        operator,
                        key,
                        value,
                    }),
            )
        };

        let query = choice((
            logical("AND", Logical::And),
            logical("OR", Logical::Or),
            logical("NOT", Logical::Not),
            comparison("EQ", Operator::Eq),
            comparison("GT", Operator::Gt),
            comparison("GTE", Operator::Gte),
            comparison("LT", Operator::Lt),
            comparison("LTE", Operator::Lte),
            double_quoted_string.map(Into::into),
            single_quoted_string.map(Into::into),
            number_value.try_map(|n: &str, span| {
                parse_number(n, false)
                    .map(QueryPart::Value)
                    .map_err(|e| Rich::custom(span, e))
            }),
            string.map(Into::into),
        ))
        .separated_by(whitespace().at_least(1))
        .collect()
        .padded();

        query
    })
    .then_ignore(end())
    .map(Vec::<QueryPart>::into)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::compile_query;
    use crate::query::{and, eq, gte, lt, not, or, query};

    #[test]
    fn terms() {
        assert_eq!(
            compile_query("  Building 'Main Street'  \"say \\\"hi\\\"\" 3D 12 -0.5 .5e1 ").unwrap(),
            query!["Building", "Main Street", "say \"hi\"", "3D", 12., -0.5, 5.]
        );
        assert_eq!(compile_query("'OR(a b)'").unwrap(), query!["OR(a b)"]);
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            compile_query("EQ( 'gml:id' \"x 1\" ) GTE(height 10) LT(ratio 0.25)").unwrap(),
            query![
                eq!["gml:id", "x 1"],
                gte!["height", 10],
                lt!["ratio", 0.25]
            ]
        );
    }

    #[test]
    fn nested_logical() {
        assert_eq!(
            compile_query("OR(EQ(layer roads) AND(bridge NOT(tunnel))) river").unwrap(),
            query![
                or![eq!["layer", "roads"], and!["bridge", not!["tunnel"]]],
                "river"
            ]
        );
    }

    #[test]
    fn unbalanced() {
        assert!(compile_query("river )").is_err());
        assert!(compile_query("NOT(river))").is_err());
    }
}
