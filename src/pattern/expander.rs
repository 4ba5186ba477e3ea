//! The inverse of matching: substitute bindings into template terms.
//!
//! Each template term starts from the expansion set `{""}`.  Literal
//! segments append to every element; a bound variable cross-multiplies the
//! set with its value list, so a plural variable multiplies the containing
//! term and two plural variables in one term produce the full cross product.
//! Unbound references are not errors; they stay in the output literally.

use itertools::Itertools;

use crate::pattern::{error::PatternError, Bindings, Segment, Term, Word};

/// Expand `templates` under `bindings` into a word list.
pub fn expand(bindings: &Bindings, templates: &[Term]) -> Vec<Word> {
    templates
        .iter()
        .flat_map(|term| expand_term(bindings, term))
        .collect()
}

/// Expand a single template term.
pub fn expand_term(bindings: &Bindings, template: &Term) -> Vec<Word> {
    let mut current = vec![String::new()];
    for segment in template.segments() {
        match segment {
            Segment::Literal(text) => {
                for element in &mut current {
                    element.push_str(text);
                }
            }
            Segment::Var { name, plural } => match bindings.get(name) {
                Some(values) => {
                    // Value-major order: every current element is extended by
                    // the first value before any element sees the second.
                    current = values
                        .iter()
                        .cartesian_product(current.iter())
                        .map(|(value, element)| format!("{}{}", element, value))
                        .collect();
                }
                None => {
                    let reference = Segment::Var {
                        name: name.clone(),
                        plural: *plural,
                    }
                    .to_string();
                    for element in &mut current {
                        element.push_str(&reference);
                    }
                }
            },
        }
    }
    current
}

/// Expand a whitespace-tokenized template string, rejoining with single
/// spaces.  Used for rule commands, whose tokens follow the same variable
/// language as pattern terms.
pub fn expand_command(bindings: &Bindings, template: &str) -> Result<String, PatternError> {
    let terms = Term::parse_all(&template.split_whitespace().collect::<Vec<_>>())?;
    Ok(expand(bindings, &terms).join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::matcher::match_terms;

    fn words(text: &str) -> Vec<Word> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        pairs
            .iter()
            .map(|(name, values)| (name.to_string(), words(values)))
            .collect()
    }

    fn template(text: &str) -> Vec<Term> {
        Term::parse_all(&text.split_whitespace().collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn cross_product_is_value_major() {
        let b = bindings(&[("xs", "1 2 3"), ("ys", "a b")]);
        assert_eq!(
            expand(&b, &template("%@xs-%@ys")),
            words("1-a 2-a 3-a 1-b 2-b 3-b")
        );
    }

    #[test]
    fn unbound_references_stay_literal() {
        let b = bindings(&[("x", "10")]);
        assert_eq!(expand(&b, &template("%x-%y %@zs")), words("10-%y %@zs"));
    }

    #[test]
    fn empty_plural_multiplies_the_term_away() {
        let mut b = Bindings::new();
        b.insert("xs", Vec::new());
        assert_eq!(expand(&b, &template("obj/%@xs.o tail")), words("tail"));
    }

    #[test]
    fn values_expand_in_list_order() {
        let b = bindings(&[("xs", "c b a")]);
        assert_eq!(expand(&b, &template("%@xs.o")), words("c.o b.o a.o"));
    }

    #[test]
    fn expand_then_match_round_trips() {
        let pattern = template("%name-%@parts.o");
        let b = bindings(&[("name", "core"), ("parts", "io net fs")]);
        let expanded = expand(&b, &pattern);
        assert_eq!(expanded, words("core-io.o core-net.o core-fs.o"));
        let rebound = match_terms(&pattern, &expanded).unwrap();
        assert_eq!(rebound, b);
    }

    #[test]
    fn command_expansion_joins_with_spaces() {
        let b = bindings(&[("in", "a.c b.c"), ("out", "prog")]);
        assert_eq!(
            expand_command(&b, "cc -o %out %in").unwrap(),
            "cc -o prog a.c b.c"
        );
    }
}
