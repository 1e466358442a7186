//! Built-in plan modifiers
//!
//! Plan modifiers run per attribute after defaults are applied. They can
//! rewrite the planned value (diff suppression, carrying computed values
//! forward) or flag the attribute as forcing replacement.

use crate::schema::{Block, PlanModifier, PlanModifierRequest, PlanModifierResponse};
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

/// Marks an attribute as requiring replacement when it changes
pub struct RequiresReplaceIfChanged;

impl RequiresReplaceIfChanged {
    pub fn create() -> Box<dyn PlanModifier> {
        Box::new(Self)
    }
}

impl PlanModifier for RequiresReplaceIfChanged {
    fn description(&self) -> String {
        "changing this value forces a new resource".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let state = &request.state_value.value;
        let plan = &request.plan_value.value;
        let requires_replace = !matches!(
            (state, plan),
            (Dynamic::Null, Dynamic::Null) | (Dynamic::Unknown, _) | (_, Dynamic::Unknown)
        ) && !request.resource_state.is_null()
            && !values_equal(state, plan);

        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: vec![],
        }
    }
}

/// Uses the prior state value when the planned value is unknown
///
/// Keeps computed attributes such as `id` stable across plans.
pub struct UseStateForUnknown;

impl UseStateForUnknown {
    pub fn create() -> Box<dyn PlanModifier> {
        Box::new(Self)
    }
}

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "once set, the value is carried forward from state".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let plan_value = match (&request.plan_value.value, &request.state_value.value) {
            (Dynamic::Unknown | Dynamic::Null, Dynamic::Null) => request.plan_value,
            (Dynamic::Unknown | Dynamic::Null, _) => request.state_value,
            _ => request.plan_value,
        };

        PlanModifierResponse {
            plan_value,
            requires_replace: false,
            diagnostics: vec![],
        }
    }
}

/// Keeps the prior state value whenever the predicate reports the planned
/// change as insignificant
pub struct SuppressDiffIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    predicate: F,
    description: String,
}

impl<F> SuppressDiffIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync + 'static,
{
    pub fn create(predicate: F, description: impl Into<String>) -> Box<dyn PlanModifier> {
        Box::new(Self {
            predicate,
            description: description.into(),
        })
    }
}

impl<F> PlanModifier for SuppressDiffIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let suppress = !request.resource_state.is_null()
            && !request.plan_value.is_unknown()
            && (self.predicate)(&request);

        PlanModifierResponse {
            plan_value: if suppress {
                request.state_value
            } else {
                request.plan_value
            },
            requires_replace: false,
            diagnostics: vec![],
        }
    }
}

/// Suppresses diffs between strings that only differ in surrounding whitespace
pub fn trim_space_equal() -> Box<dyn PlanModifier> {
    SuppressDiffIf::create(
        |request: &PlanModifierRequest| {
            match (request.state_value.value.as_str(), request.plan_value.value.as_str()) {
                (Some(old), Some(new)) => old.trim() == new.trim(),
                (None, Some(new)) => new.trim().is_empty(),
                (Some(old), None) => old.trim().is_empty() && request.plan_value.is_null(),
                (None, None) => true,
            }
        },
        "whitespace-only changes are ignored",
    )
}

/// Suppresses any diff while the prior value is empty or null
pub fn prior_empty() -> Box<dyn PlanModifier> {
    SuppressDiffIf::create(
        |request: &PlanModifierRequest| match &request.state_value.value {
            Dynamic::Null => true,
            Dynamic::String(s) => s.trim().is_empty(),
            _ => false,
        },
        "changes are ignored until a value has been stored",
    )
}

/// Result of running every attribute plan modifier in a block
pub struct PlanModification {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the plan modifiers declared on the top-level attributes of `block`
pub fn apply_plan_modifiers(
    block: &Block,
    config: &DynamicValue,
    prior_state: &DynamicValue,
    proposed: DynamicValue,
) -> PlanModification {
    let mut planned_state = proposed;
    let mut requires_replace = Vec::new();
    let mut diagnostics = Vec::new();

    for attr in block.attributes.iter().filter(|a| !a.plan_modifiers.is_empty()) {
        let path = AttributePath::new(&attr.name);
        let value_at = |dv: &DynamicValue| {
            DynamicValue::new(dv.get(&path).cloned().unwrap_or(Dynamic::Null))
        };

        let config_value = value_at(config);
        let state_value = value_at(prior_state);
        let mut plan_value = value_at(&planned_state);

        for modifier in &attr.plan_modifiers {
            let response = modifier.modify(PlanModifierRequest {
                config_value: config_value.clone(),
                state_value: state_value.clone(),
                plan_value,
                path: path.clone(),
                resource_config: config.clone(),
                resource_state: prior_state.clone(),
            });
            plan_value = response.plan_value;
            diagnostics.extend(response.diagnostics);
            if response.requires_replace && !requires_replace.contains(&path) {
                tracing::debug!("attribute {} forces replacement", path);
                requires_replace.push(path.clone());
            }
        }

        if let Err(e) = planned_state.set(&path, plan_value.value) {
            diagnostics.push(
                Diagnostic::error("Failed to apply plan modifier", e.to_string())
                    .with_attribute(path),
            );
        }
    }

    PlanModification {
        planned_state,
        requires_replace,
        diagnostics,
    }
}

/// Structural equality with float tolerance for numbers
pub fn values_equal(a: &Dynamic, b: &Dynamic) -> bool {
    match (a, b) {
        (Dynamic::Null, Dynamic::Null) => true,
        (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
        (Dynamic::Number(a), Dynamic::Number(b)) => (a - b).abs() < f64::EPSILON,
        (Dynamic::String(a), Dynamic::String(b)) => a == b,
        (Dynamic::List(a), Dynamic::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Dynamic::Map(a), Dynamic::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
    use std::collections::HashMap;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifierRequest {
        PlanModifierRequest {
            config_value: DynamicValue::new(plan.clone()),
            state_value: DynamicValue::new(state),
            plan_value: DynamicValue::new(plan),
            path: AttributePath::new("field"),
            resource_config: DynamicValue::object(),
            resource_state: DynamicValue::object(),
        }
    }

    #[test]
    fn requires_replace_if_changed_does_not_trigger_on_same_value() {
        let response = RequiresReplaceIfChanged.modify(request(
            Dynamic::String("ubuntu-template".to_string()),
            Dynamic::String("ubuntu-template".to_string()),
        ));
        assert!(!response.requires_replace);
    }

    #[test]
    fn requires_replace_if_changed_triggers_on_different_value() {
        let response = RequiresReplaceIfChanged.modify(request(
            Dynamic::String("ubuntu-template".to_string()),
            Dynamic::String("debian-template".to_string()),
        ));
        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_if_changed_ignores_unknown_and_create() {
        let response = RequiresReplaceIfChanged
            .modify(request(Dynamic::String("a".to_string()), Dynamic::Unknown));
        assert!(!response.requires_replace);

        let mut create = request(Dynamic::Null, Dynamic::String("a".to_string()));
        create.resource_state = DynamicValue::null();
        assert!(!RequiresReplaceIfChanged.modify(create).requires_replace);
    }

    #[test]
    fn use_state_for_unknown_carries_prior_value() {
        let response = UseStateForUnknown.modify(request(
            Dynamic::String("pve/qemu/100".to_string()),
            Dynamic::Unknown,
        ));
        assert_eq!(
            response.plan_value.value,
            Dynamic::String("pve/qemu/100".to_string())
        );
    }

    #[test]
    fn trim_space_equal_keeps_prior_value() {
        let modifier = trim_space_equal();
        let response = modifier.modify(request(
            Dynamic::String("ssh-rsa AAA".to_string()),
            Dynamic::String("ssh-rsa AAA\n".to_string()),
        ));
        assert_eq!(
            response.plan_value.value,
            Dynamic::String("ssh-rsa AAA".to_string())
        );

        let response = modifier.modify(request(
            Dynamic::String("one".to_string()),
            Dynamic::String("two".to_string()),
        ));
        assert_eq!(response.plan_value.value, Dynamic::String("two".to_string()));
    }

    #[test]
    fn prior_empty_suppresses_only_without_prior_value() {
        let modifier = prior_empty();
        let response = modifier.modify(request(Dynamic::Null, Dynamic::Number(30.0)));
        assert_eq!(response.plan_value.value, Dynamic::Null);

        let response = modifier.modify(request(Dynamic::Number(30.0), Dynamic::Number(60.0)));
        assert_eq!(response.plan_value.value, Dynamic::Number(60.0));
    }

    #[test]
    fn apply_plan_modifiers_collects_replacements() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("clone", AttributeType::String)
                    .optional()
                    .plan_modifier(RequiresReplaceIfChanged::create())
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("desc", AttributeType::String)
                    .optional()
                    .plan_modifier(trim_space_equal())
                    .build(),
            )
            .build();

        let prior = DynamicValue::new(Dynamic::Map(HashMap::from([
            ("clone".to_string(), Dynamic::String("tmpl-a".to_string())),
            ("desc".to_string(), Dynamic::String("web".to_string())),
        ])));
        let proposed = DynamicValue::new(Dynamic::Map(HashMap::from([
            ("clone".to_string(), Dynamic::String("tmpl-b".to_string())),
            ("desc".to_string(), Dynamic::String(" web ".to_string())),
        ])));

        let result = apply_plan_modifiers(&schema.block, &proposed, &prior, proposed.clone());

        assert_eq!(result.requires_replace, vec![AttributePath::new("clone")]);
        assert_eq!(
            result
                .planned_state
                .get_string(&AttributePath::new("desc"))
                .unwrap(),
            "web"
        );
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn values_equal_compares_nested_structures() {
        let a = Dynamic::List(vec![Dynamic::Map(HashMap::from([(
            "id".to_string(),
            Dynamic::Number(0.0),
        )]))]);
        assert!(values_equal(&a, &a.clone()));
        assert!(!values_equal(&a, &Dynamic::List(vec![])));
    }
}
