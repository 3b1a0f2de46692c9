const BASE_EVENTS: &[&str] = &["agent", "chat", "diagnostic", "heartbeat", "health"];

/// Builds the deduplicated set of events to subscribe to: the fixed base
/// set plus anything the gateway advertised in `hello-ok.features.events`.
pub fn build_subscription_plan(advertised_events: Option<&[String]>) -> Vec<String> {
    let mut plan: Vec<String> = BASE_EVENTS.iter().map(|s| s.to_string()).collect();
    if let Some(advertised) = advertised_events {
        for event in advertised {
            if !plan.contains(event) {
                plan.push(event.clone());
            }
        }
    }
    plan
}

/// Returns `true` if `plan` does not already include `presence`, meaning a
/// separate `subscribe(["presence"])` call is required.
pub fn needs_presence_followup(plan: &[String]) -> bool {
    !plan.iter().any(|event| event == "presence")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_build_subscription_plan_includes_base_set() {
        let plan = build_subscription_plan(None);
        assert!(plan.contains(&"agent".to_string()));
        assert!(plan.contains(&"heartbeat".to_string()));
    }

    #[test]
    fn functional_build_subscription_plan_dedups_advertised_events() {
        let advertised = vec!["agent".to_string(), "custom".to_string()];
        let plan = build_subscription_plan(Some(&advertised));
        assert_eq!(plan.iter().filter(|e| *e == "agent").count(), 1);
        assert!(plan.contains(&"custom".to_string()));
    }

    #[test]
    fn unit_needs_presence_followup_true_when_absent() {
        let plan = build_subscription_plan(None);
        assert!(needs_presence_followup(&plan));
    }

    #[test]
    fn unit_needs_presence_followup_false_when_advertised() {
        let advertised = vec!["presence".to_string()];
        let plan = build_subscription_plan(Some(&advertised));
        assert!(!needs_presence_followup(&plan));
    }
}
