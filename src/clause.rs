use regex::Regex;
use semver::Version;

use crate::{
    context::Attribute,
    flag::{Clause, Operator},
    AttributeValue, EvaluationContext,
};

impl Clause {
    /// Return `true` if the context satisfies this clause.
    ///
    /// A missing attribute or an empty value list never matches. `negate` is applied last, so a
    /// negated clause on a missing attribute does match.
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        let matched = match context.resolve(&self.attribute) {
            Some(attribute) if !self.values.is_empty() => {
                self.operator.eval(attribute, &self.values)
            }
            _ => false,
        };
        matched != self.negate
    }
}

impl Operator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    pub(crate) fn eval(self, attribute: Attribute<'_>, values: &[AttributeValue]) -> bool {
        match self {
            // Non-membership has to hold for every value, not for any of them.
            Self::NotIn => !Self::In.eval(attribute, values),
            _ => values
                .iter()
                .any(|v| self.try_eval(attribute, v.as_attribute()).unwrap_or(false)),
        }
    }

    /// Try applying `Operator` to a single operand, returning `None` if the operator cannot be
    /// applied.
    fn try_eval(self, attribute: Attribute<'_>, value: Attribute<'_>) -> Option<bool> {
        match self {
            Self::Eq | Self::In => Some(attribute.to_str() == value.to_str()),
            Self::Neq => Some(attribute.to_str() != value.to_str()),
            Self::NotIn => None,

            Self::Contains => {
                let value = value.to_str();
                Some(match attribute {
                    Attribute::List(items) => items.iter().any(|item| *item == value),
                    _ => attribute.to_str().contains(&*value),
                })
            }
            Self::StartsWith => Some(attribute.to_str().starts_with(&*value.to_str())),
            Self::EndsWith => Some(attribute.to_str().ends_with(&*value.to_str())),

            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                // Integers compare exactly, anything else as f64.
                let ordering = match (attribute, value) {
                    (Attribute::Int(a), Attribute::Int(v)) => a.cmp(&v),
                    _ => attribute.as_number()?.partial_cmp(&value.as_number()?)?,
                };
                Some(match self {
                    Self::Gt => ordering.is_gt(),
                    Self::Gte => ordering.is_ge(),
                    Self::Lt => ordering.is_lt(),
                    Self::Lte => ordering.is_le(),
                    _ => return None,
                })
            }

            Self::Matches => {
                let regex = Regex::new(&value.to_str()).ok()?;
                Some(regex.is_match(&attribute.to_str()))
            }

            Self::SemverEq | Self::SemverGt | Self::SemverLt => {
                let attribute = Version::parse(&attribute.to_str()).ok()?;
                let value = Version::parse(&value.to_str()).ok()?;
                Some(match self {
                    Self::SemverEq => attribute == value,
                    Self::SemverGt => attribute > value,
                    Self::SemverLt => attribute < value,
                    _ => return None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        flag::{Clause, Operator},
        AttributeValue, EvaluationContext,
    };

    fn clause(attribute: &str, operator: Operator, values: Vec<AttributeValue>) -> Clause {
        Clause {
            attribute: attribute.to_owned(),
            operator,
            values,
            negate: false,
        }
    }

    fn context() -> EvaluationContext {
        EvaluationContext::builder("user-1")
            .email("alice@example.com")
            .country("US")
            .groups(["admins", "beta"])
            .custom("port", "8080")
            .custom("age", 30)
            .custom("version", "1.13.0")
            .build()
    }

    #[test]
    fn eq_compares_string_forms() {
        let ctx = context();
        assert!(clause("country", Operator::Eq, vec!["US".into()]).matches(&ctx));
        assert!(!clause("country", Operator::Eq, vec!["CA".into()]).matches(&ctx));
        assert!(clause("country", Operator::Eq, vec!["CA".into(), "US".into()]).matches(&ctx));

        // "8080" attribute against numeric operand and 30 against string operand
        assert!(clause("port", Operator::Eq, vec![8080.into()]).matches(&ctx));
        assert!(clause("age", Operator::Eq, vec!["30".into()]).matches(&ctx));
    }

    #[test]
    fn eq_on_unset_country_is_false() {
        let ctx = EvaluationContext::new("user-1");
        assert!(!clause("country", Operator::Eq, vec!["US".into()]).matches(&ctx));
    }

    #[test]
    fn neq() {
        let ctx = context();
        assert!(clause("country", Operator::Neq, vec!["CA".into()]).matches(&ctx));
        assert!(!clause("country", Operator::Neq, vec!["US".into()]).matches(&ctx));
    }

    #[test]
    fn contains_checks_list_membership() {
        let ctx = context();
        assert!(clause("groups", Operator::Contains, vec!["beta".into()]).matches(&ctx));
        assert!(!clause("groups", Operator::Contains, vec!["bet".into()]).matches(&ctx));
        assert!(
            clause("groups", Operator::Contains, vec!["ops".into(), "admins".into()]).matches(&ctx)
        );
    }

    #[test]
    fn contains_checks_substring() {
        let ctx = context();
        assert!(clause("email", Operator::Contains, vec!["@example".into()]).matches(&ctx));
        assert!(!clause("email", Operator::Contains, vec!["@test".into()]).matches(&ctx));
    }

    #[test]
    fn starts_and_ends_with() {
        let ctx = context();
        assert!(clause("email", Operator::StartsWith, vec!["alice".into()]).matches(&ctx));
        assert!(!clause("email", Operator::StartsWith, vec!["bob".into()]).matches(&ctx));
        assert!(clause("email", Operator::EndsWith, vec!["@example.com".into()]).matches(&ctx));
        assert!(!clause("email", Operator::EndsWith, vec!["@test.com".into()]).matches(&ctx));
    }

    #[test]
    fn in_and_not_in() {
        let ctx = context();
        let values: Vec<AttributeValue> = vec!["US".into(), "CA".into()];
        assert!(clause("country", Operator::In, values.clone()).matches(&ctx));
        assert!(!clause("country", Operator::NotIn, values).matches(&ctx));

        let values: Vec<AttributeValue> = vec!["DE".into(), "FR".into()];
        assert!(!clause("country", Operator::In, values.clone()).matches(&ctx));
        assert!(clause("country", Operator::NotIn, values).matches(&ctx));
    }

    #[test]
    fn not_in_fails_when_attribute_is_missing() {
        let ctx = EvaluationContext::new("user-1");
        assert!(!clause("country", Operator::NotIn, vec!["US".into()]).matches(&ctx));
    }

    #[test]
    fn empty_country_behaves_like_unset() {
        let ctx = EvaluationContext::builder("user-1").country("").build();
        assert!(!clause("country", Operator::NotIn, vec!["US".into()]).matches(&ctx));
        assert!(!clause("country", Operator::Neq, vec!["US".into()]).matches(&ctx));
        assert!(!clause("country", Operator::Eq, vec!["".into()]).matches(&ctx));
    }

    #[test]
    fn numeric_comparisons() {
        let ctx = context();
        assert!(clause("age", Operator::Gt, vec![18.into()]).matches(&ctx));
        assert!(!clause("age", Operator::Gt, vec![30.into()]).matches(&ctx));
        assert!(clause("age", Operator::Gte, vec![30.into()]).matches(&ctx));
        assert!(clause("age", Operator::Lt, vec![30.5.into()]).matches(&ctx));
        assert!(!clause("age", Operator::Lt, vec![30.into()]).matches(&ctx));
        assert!(clause("age", Operator::Lte, vec![30.into()]).matches(&ctx));
    }

    #[test]
    fn large_integers_keep_their_exact_value() {
        let ctx = EvaluationContext::builder("user-1")
            .custom("account", 9_007_199_254_740_993i64)
            .build();
        assert!(clause("account", Operator::Eq, vec!["9007199254740993".into()]).matches(&ctx));
        assert!(!clause("account", Operator::Eq, vec!["9007199254740992".into()]).matches(&ctx));
        assert!(clause(
            "account",
            Operator::Gt,
            vec![9_007_199_254_740_992i64.into()]
        )
        .matches(&ctx));
    }

    #[test]
    fn numeric_comparisons_require_numbers() {
        let ctx = context();
        // string attribute
        assert!(!clause("port", Operator::Gt, vec![80.into()]).matches(&ctx));
        // string operand
        assert!(!clause("age", Operator::Gt, vec!["18".into()]).matches(&ctx));
        // a bad operand does not prevent a good one from matching
        assert!(clause("age", Operator::Gt, vec!["x".into(), 18.into()]).matches(&ctx));
    }

    #[test]
    fn regex_matches() {
        let ctx = context();
        assert!(clause("email", Operator::Matches, vec!["^alice@.*\\.com$".into()]).matches(&ctx));
        assert!(!clause("email", Operator::Matches, vec!["^bob".into()]).matches(&ctx));
    }

    #[test]
    fn invalid_regex_does_not_match() {
        let ctx = context();
        assert!(!clause("email", Operator::Matches, vec!["(unclosed".into()]).matches(&ctx));
        assert!(
            clause("email", Operator::Matches, vec!["(unclosed".into(), "alice".into()])
                .matches(&ctx)
        );
    }

    #[test]
    fn semver_comparisons() {
        let ctx = context();
        assert!(clause("version", Operator::SemverGt, vec!["1.5.0".into()]).matches(&ctx));
        assert!(!clause("version", Operator::SemverLt, vec!["1.5.0".into()]).matches(&ctx));
        assert!(clause("version", Operator::SemverEq, vec!["1.13.0".into()]).matches(&ctx));
        assert!(!clause("email", Operator::SemverGt, vec!["1.0.0".into()]).matches(&ctx));
    }

    #[test]
    fn empty_values_never_match() {
        let ctx = context();
        assert!(!clause("country", Operator::NotIn, vec![]).matches(&ctx));
        assert!(!clause("country", Operator::Neq, vec![]).matches(&ctx));
    }

    #[test]
    fn negate_is_applied_last() {
        let ctx = context();
        let mut c = clause("country", Operator::Eq, vec!["US".into()]);
        c.negate = true;
        assert!(!c.matches(&ctx));

        let mut c = clause("company", Operator::Eq, vec!["acme".into()]);
        c.negate = true;
        assert!(c.matches(&ctx));
    }
}
