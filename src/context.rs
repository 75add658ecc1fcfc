use std::{borrow::Cow, collections::HashMap};

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap of custom context attributes.
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a custom context attribute or a clause operand.
///
/// Conveniently implements `From` conversions for strings, numbers, booleans and string lists.
///
/// ```
/// # use flagvisor::AttributeValue;
/// let plan: AttributeValue = "enterprise".into();
/// let port: AttributeValue = 8080.into();
/// let ratio: AttributeValue = 0.25.into();
/// let beta: AttributeValue = true.into();
/// let teams: AttributeValue = vec!["infra".to_owned(), "web".to_owned()].into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// An integer. Kept apart from [`AttributeValue::Number`] so its string form is exact.
    Int(i64),
    /// A floating-point value.
    Number(f64),
    /// A boolean value.
    Bool(bool),
    /// An ordered sequence of strings, e.g. group membership.
    List(Vec<String>),
}

impl AttributeValue {
    pub(crate) fn as_attribute(&self) -> Attribute<'_> {
        match self {
            AttributeValue::String(s) => Attribute::Str(s),
            AttributeValue::Int(i) => Attribute::Int(*i),
            AttributeValue::Number(n) => Attribute::Number(*n),
            AttributeValue::Bool(b) => Attribute::Bool(*b),
            AttributeValue::List(l) => Attribute::List(l),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        Self::Number(value.into())
    }
}

/// A borrowed view of a resolved attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Attribute<'a> {
    Str(&'a str),
    Int(i64),
    Number(f64),
    Bool(bool),
    List(&'a [String]),
}

impl<'a> Attribute<'a> {
    /// String form used by string operators and for bucketing.
    ///
    /// Lists are joined with `,`.
    pub(crate) fn to_str(self) -> Cow<'a, str> {
        match self {
            Attribute::Str(s) => Cow::Borrowed(s),
            Attribute::Int(i) => Cow::Owned(i.to_string()),
            Attribute::Number(n) => Cow::Owned(n.to_string()),
            Attribute::Bool(b) => Cow::Borrowed(if b { "true" } else { "false" }),
            Attribute::List(l) => Cow::Owned(l.join(",")),
        }
    }

    pub(crate) fn as_number(self) -> Option<f64> {
        match self {
            Attribute::Int(i) => Some(i as f64),
            Attribute::Number(n) => Some(n),
            Attribute::Str(_) | Attribute::Bool(_) | Attribute::List(_) => None,
        }
    }
}

/// Attribute bag identifying the entity (user, request, device) a flag is evaluated for.
///
/// Contexts are immutable once built. Use [`EvaluationContext::builder`] to construct one.
///
/// Attributes are resolved by name, case-sensitively. The built-in names are `key`, `name`,
/// `email`, `ip`, `country`, `anonymous` and `groups`; any other name is looked up in the custom
/// attributes. Unset or empty built-in fields are treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    country: Option<String>,
    #[serde(default)]
    anonymous: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    groups: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    custom: Attributes,
}

impl EvaluationContext {
    /// Create a context that has only a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self::builder(key).build()
    }

    /// Start building a context for the entity identified by `key`.
    ///
    /// ```
    /// # use flagvisor::EvaluationContext;
    /// let context = EvaluationContext::builder("user-1")
    ///     .email("alice@example.com")
    ///     .country("US")
    ///     .group("beta-testers")
    ///     .custom("plan", "enterprise")
    ///     .build();
    /// assert_eq!(context.key(), "user-1");
    /// ```
    pub fn builder(key: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            context: EvaluationContext {
                key: key.into(),
                name: None,
                email: None,
                ip: None,
                country: None,
                anonymous: false,
                groups: Vec::new(),
                custom: HashMap::new(),
            },
        }
    }

    /// Stable identifier of the entity.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn custom_attributes(&self) -> &Attributes {
        &self.custom
    }

    /// Resolve an attribute by name. Built-in fields shadow custom attributes of the same name.
    pub(crate) fn resolve(&self, name: &str) -> Option<Attribute<'_>> {
        match name {
            "key" => non_empty(Some(self.key.as_str())),
            "name" => non_empty(self.name.as_deref()),
            "email" => non_empty(self.email.as_deref()),
            "ip" => non_empty(self.ip.as_deref()),
            "country" => non_empty(self.country.as_deref()),
            "anonymous" => Some(Attribute::Bool(self.anonymous)),
            "groups" if !self.groups.is_empty() => Some(Attribute::List(&self.groups)),
            "groups" => None,
            _ => self.custom.get(name).map(AttributeValue::as_attribute),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<Attribute<'_>> {
    value.filter(|s| !s.is_empty()).map(Attribute::Str)
}

/// Builder for [`EvaluationContext`].
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    context: EvaluationContext,
}

impl ContextBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.context.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.context.email = Some(email.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.context.ip = Some(ip.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.context.country = Some(country.into());
        self
    }

    pub fn anonymous(mut self, anonymous: bool) -> Self {
        self.context.anonymous = anonymous;
        self
    }

    /// Append a single group membership.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.context.groups.push(group.into());
        self
    }

    /// Append several group memberships, preserving their order.
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context
            .groups
            .extend(groups.into_iter().map(Into::into));
        self
    }

    /// Set a custom attribute, replacing any previous value under the same name.
    pub fn custom(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.context.custom.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> EvaluationContext {
        self.context
    }
}
