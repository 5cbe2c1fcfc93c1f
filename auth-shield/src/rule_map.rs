//! Rule map construction
//!
//! A [`RuleSpec`] names rules for the parts of the schema the caller cares
//! about. [`RuleMap::build`] checks it against a schema and turns it into a
//! total mapping: every field of every object type resolves to exactly one
//! rule. Every rule node reachable from the map gets a [`RuleId`], which is
//! the rule's identity in the evaluation cache.

use crate::combinators::allow;
use crate::error::{Result, ShieldError};
use crate::rule::ShieldRule;
use query_pipeline::Schema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Field name that stands for "every other field of the type"
pub const WILDCARD: &str = "*";

/// Opaque identity of a rule node within one rule map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u32);

impl From<u32> for RuleId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// Rules bound to one object type
pub struct TypeRules<C> {
    all: Option<ShieldRule<C>>,
    fields: BTreeMap<String, ShieldRule<C>>,
}

impl<C> Default for TypeRules<C> {
    fn default() -> Self {
        Self {
            all: None,
            fields: BTreeMap::new(),
        }
    }
}

impl<C> Clone for TypeRules<C> {
    fn clone(&self) -> Self {
        Self {
            all: self.all.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl<C> TypeRules<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule for every field not named explicitly
    pub fn all(mut self, rule: ShieldRule<C>) -> Self {
        self.all = Some(rule);
        self
    }

    /// Rule for one field; [`WILDCARD`] is the same as [`TypeRules::all`]
    pub fn field(mut self, field: impl Into<String>, rule: ShieldRule<C>) -> Self {
        let field = field.into();
        if field == WILDCARD {
            self.all = Some(rule);
        } else {
            self.fields.insert(field, rule);
        }
        self
    }
}

/// Partial, declarative rule tree
pub struct RuleSpec<C> {
    types: BTreeMap<String, TypeRules<C>>,
    fallback: Option<ShieldRule<C>>,
}

impl<C> Default for RuleSpec<C> {
    fn default() -> Self {
        Self {
            types: BTreeMap::new(),
            fallback: None,
        }
    }
}

impl<C> Clone for RuleSpec<C> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<C> fmt::Debug for RuleSpec<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: BTreeMap<&str, Vec<&str>> = self
            .types
            .iter()
            .map(|(name, rules)| {
                let mut fields: Vec<&str> = rules.fields.keys().map(String::as_str).collect();
                if rules.all.is_some() {
                    fields.push(WILDCARD);
                }
                (name.as_str(), fields)
            })
            .collect();
        f.debug_struct("RuleSpec")
            .field("types", &types)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl<C> RuleSpec<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind all rules of one type at once, merging with earlier bindings
    pub fn object(mut self, type_name: impl Into<String>, rules: TypeRules<C>) -> Self {
        let entry = self.types.entry(type_name.into()).or_default();
        if rules.all.is_some() {
            entry.all = rules.all;
        }
        entry.fields.extend(rules.fields);
        self
    }

    pub fn type_rule(self, type_name: impl Into<String>, rule: ShieldRule<C>) -> Self {
        self.object(type_name, TypeRules::new().all(rule))
    }

    pub fn field(
        self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        rule: ShieldRule<C>,
    ) -> Self {
        self.object(type_name, TypeRules::new().field(field, rule))
    }

    /// Rule for everything the spec does not otherwise cover
    pub fn fallback(mut self, rule: ShieldRule<C>) -> Self {
        self.fallback = Some(rule);
        self
    }
}

/// Total (type, field) → rule mapping
pub struct RuleMap<C> {
    fields: HashMap<String, HashMap<String, ShieldRule<C>>>,
    requirements: HashMap<(String, String), Vec<String>>,
    ids: HashMap<usize, RuleId>,
    nodes: Vec<ShieldRule<C>>,
}

impl<C> fmt::Debug for RuleMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleMap")
            .field("types", &self.fields.len())
            .field("rules", &self.nodes.len())
            .field("requirements", &self.requirements.len())
            .finish()
    }
}

fn address<C>(rule: &ShieldRule<C>) -> usize {
    Arc::as_ptr(rule) as *const () as usize
}

impl<C> RuleMap<C>
where
    C: Send + Sync + 'static,
{
    /// Check `spec` against `schema` and resolve every field's rule
    pub fn build(spec: &RuleSpec<C>, schema: &Schema<C>) -> Result<Self> {
        for (type_name, rules) in &spec.types {
            let object = schema
                .object_type(type_name)
                .ok_or_else(|| ShieldError::UnknownType(type_name.clone()))?;
            for field in rules.fields.keys() {
                if object.get_field(field).is_none() {
                    return Err(ShieldError::UnknownField {
                        type_name: type_name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        let mut map = Self {
            fields: HashMap::new(),
            requirements: HashMap::new(),
            ids: HashMap::new(),
            nodes: Vec::new(),
        };
        let default_rule = spec.fallback.clone().unwrap_or_else(allow);

        for object in schema.object_types() {
            let bound = spec.types.get(object.name());
            let mut fields = HashMap::new();
            for field in object.fields() {
                let rule = bound
                    .and_then(|rules| rules.fields.get(field.name()).or(rules.all.as_ref()))
                    .unwrap_or(&default_rule)
                    .clone();

                map.register(&rule)?;
                let mut requirements = Vec::new();
                collect_requirements(&rule, &mut requirements);
                if !requirements.is_empty() {
                    map.requirements.insert(
                        (object.name().to_string(), field.name().to_string()),
                        requirements,
                    );
                }
                fields.insert(field.name().to_string(), rule);
            }
            map.fields.insert(object.name().to_string(), fields);
        }

        info!(
            types = map.fields.len(),
            rules = map.nodes.len(),
            requirements = map.requirements.len(),
            "Rule map built"
        );
        Ok(map)
    }

    /// Assign ids to `rule` and everything below it, depth first
    fn register(&mut self, rule: &ShieldRule<C>) -> Result<()> {
        if self.ids.contains_key(&address(rule)) {
            return Ok(());
        }
        let id = u32::try_from(self.nodes.len())
            .map_err(|_| anyhow::anyhow!("Rule map exceeds {} rule nodes", u32::MAX))?;
        self.ids.insert(address(rule), RuleId(id));
        self.nodes.push(rule.clone());
        for child in rule.children() {
            self.register(&child)?;
        }
        Ok(())
    }

    /// Rule bound to `type_name.field`; `None` only for coordinates outside
    /// the schema
    pub fn rule_for(&self, type_name: &str, field: &str) -> Option<&ShieldRule<C>> {
        self.fields.get(type_name)?.get(field)
    }

    pub fn rule_id(&self, rule: &ShieldRule<C>) -> Option<RuleId> {
        self.ids.get(&address(rule)).copied()
    }

    /// Selection texts the rule of `type_name.field` needs next to the field
    pub fn requirements(&self, type_name: &str, field: &str) -> &[String] {
        self.requirements
            .get(&(type_name.to_string(), field.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_requirements(&self) -> bool {
        !self.requirements.is_empty()
    }

    /// Number of distinct rule nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn collect_requirements<C>(rule: &ShieldRule<C>, out: &mut Vec<String>)
where
    C: Send + Sync + 'static,
{
    if let Some(requirement) = rule.requirement() {
        if !out.iter().any(|known| known == requirement) {
            out.push(requirement.to_string());
        }
    }
    for child in rule.children() {
        collect_requirements(&child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinators::{and, deny, input};
    use query_pipeline::{FieldDefinition, ObjectType, TypeRef};

    fn schema() -> Schema<()> {
        Schema::builder()
            .query(
                ObjectType::new("Query")
                    .field(FieldDefinition::new("secret", TypeRef::named("String")))
                    .field(FieldDefinition::new("public", TypeRef::named("String")))
                    .field(FieldDefinition::new("me", TypeRef::named("User"))),
            )
            .object(
                ObjectType::new("User")
                    .field(FieldDefinition::new("id", TypeRef::named("ID")))
                    .field(FieldDefinition::new("email", TypeRef::named("String"))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_coordinates_fail_construction() {
        let spec = RuleSpec::new().field("Nope", "secret", deny("no"));
        assert!(matches!(
            RuleMap::build(&spec, &schema()),
            Err(ShieldError::UnknownType(name)) if name == "Nope"
        ));

        let spec = RuleSpec::new().field("Query", "missing", deny("no"));
        assert!(matches!(
            RuleMap::build(&spec, &schema()),
            Err(ShieldError::UnknownField { field, .. }) if field == "missing"
        ));
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let secret = deny("secret");
        let users = deny("users");
        let everything = deny("fallback");
        let spec = RuleSpec::new()
            .field("Query", "secret", secret.clone())
            .object("User", TypeRules::new().field(WILDCARD, users.clone()))
            .fallback(everything.clone());
        let map = RuleMap::build(&spec, &schema()).unwrap();

        let rule = |t: &str, f: &str| map.rule_for(t, f).unwrap().clone();
        assert!(Arc::ptr_eq(&rule("Query", "secret"), &secret));
        assert!(Arc::ptr_eq(&rule("User", "email"), &users));
        assert!(Arc::ptr_eq(&rule("Query", "public"), &everything));
        assert!(map.rule_for("Query", "nothing").is_none());
    }

    #[test]
    fn test_every_node_gets_one_id() {
        let shared = deny("shared");
        let spec = RuleSpec::new()
            .field("Query", "secret", and(vec![shared.clone(), deny("other")]))
            .field("Query", "public", shared.clone());
        let map = RuleMap::build(&spec, &schema()).unwrap();

        // and + shared + other + default allow
        assert_eq!(map.len(), 4);
        let id = map.rule_id(&shared).unwrap();
        assert_eq!(map.rule_id(map.rule_for("Query", "public").unwrap()), Some(id));
        assert!(map.rule_id(&deny("unregistered")).is_none());
    }

    #[test]
    fn test_requirements_are_collected_through_children() {
        let spec = RuleSpec::new().field(
            "Query",
            "secret",
            and(vec![input("{ public }", deny("no")), input("{ public }", deny("no"))]),
        );
        let map = RuleMap::build(&spec, &schema()).unwrap();
        assert!(map.has_requirements());
        assert_eq!(map.requirements("Query", "secret"), ["{ public }".to_string()]);
        assert!(map.requirements("Query", "public").is_empty());
    }
}
