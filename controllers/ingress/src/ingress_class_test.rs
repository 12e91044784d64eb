//! Unit tests for ingress ownership resolution

#[cfg(test)]
mod tests {
    use crate::ingress_class::*;
    use crate::store::ResourceStore;
    use crate::test_utils::*;
    use k8s_openapi::api::networking::v1::IngressClass;
    use kube::ResourceExt;

    const OTHER_CONTROLLER: &str = "other.io/controller";

    struct Scenario {
        name: &'static str,
        classes: Vec<IngressClass>,
        expected: Vec<&'static str>,
    }

    /// Three ingresses: one naming our class, one naming another class, one naming none.
    fn owned_names(classes: &[IngressClass]) -> Vec<String> {
        let store = ResourceStore::new();
        for class in classes {
            store.update_resource(class.clone());
        }
        store.update_resource(simple_ingress("test", "matching", Some("ngrok"), "a.example.com", "a", 80));
        store.update_resource(simple_ingress("test", "not-matching", Some("other"), "b.example.com", "b", 80));
        store.update_resource(simple_ingress("test", "no-class", None, "c.example.com", "c", 80));

        owned_ingresses(&store, TEST_CONTROLLER)
            .iter()
            .map(|ing| ing.name_any())
            .collect()
    }

    #[test]
    fn test_ownership_table() {
        let us_default = test_ingress_class("ngrok", TEST_CONTROLLER, true);
        let us_not_default = test_ingress_class("ngrok", TEST_CONTROLLER, false);
        let us_second_default = test_ingress_class("ngrok-2", TEST_CONTROLLER, true);
        let us_second_not_default = test_ingress_class("ngrok-2", TEST_CONTROLLER, false);
        let other_default = test_ingress_class("other", OTHER_CONTROLLER, true);
        let other_not_default = test_ingress_class("other", OTHER_CONTROLLER, false);

        let scenarios = vec![
            Scenario { name: "no ingress classes", classes: vec![], expected: vec![] },
            Scenario { name: "just us not as default", classes: vec![us_not_default.clone()], expected: vec!["matching"] },
            Scenario { name: "just us as default", classes: vec![us_default.clone()], expected: vec!["matching", "no-class"] },
            Scenario { name: "just another not as default", classes: vec![other_not_default.clone()], expected: vec![] },
            Scenario { name: "just another as default", classes: vec![other_default.clone()], expected: vec![] },
            Scenario {
                name: "us and another neither default",
                classes: vec![us_not_default.clone(), other_not_default.clone()],
                expected: vec!["matching"],
            },
            Scenario {
                name: "us and another them default",
                classes: vec![us_not_default.clone(), other_default.clone()],
                expected: vec!["matching"],
            },
            Scenario {
                name: "us and another us default",
                classes: vec![us_default.clone(), other_not_default.clone()],
                expected: vec!["matching", "no-class"],
            },
            Scenario {
                name: "us and another both default",
                classes: vec![us_default.clone(), other_default.clone()],
                expected: vec!["matching", "no-class"],
            },
            Scenario {
                name: "two of ours both default",
                classes: vec![us_default.clone(), us_second_default.clone()],
                expected: vec!["matching"],
            },
            Scenario {
                name: "two of ours one default",
                classes: vec![us_default.clone(), us_second_not_default.clone()],
                expected: vec!["matching", "no-class"],
            },
            Scenario {
                name: "two of ours neither default",
                classes: vec![us_not_default.clone(), us_second_not_default.clone()],
                expected: vec!["matching"],
            },
            Scenario {
                name: "only our second class as default",
                classes: vec![us_second_default.clone()],
                expected: vec!["no-class"],
            },
        ];

        for scenario in scenarios {
            let owned = owned_names(&scenario.classes);
            let mut expected: Vec<String> = scenario.expected.iter().map(|s| s.to_string()).collect();
            expected.sort();
            let mut owned_sorted = owned.clone();
            owned_sorted.sort();
            assert_eq!(owned_sorted, expected, "scenario: {}", scenario.name);
        }
    }

    #[test]
    fn test_single_default_among_ours_wins_over_other_default() {
        let classes = vec![
            test_ingress_class("ngrok", "k8s.ngrok.com", true),
            test_ingress_class("other", "other.io", true),
        ];
        let ingress = simple_ingress("ns", "web", None, "a.example.com", "svc", 80);
        assert!(is_owned(&classes, &ingress, "k8s.ngrok.com"));

        let classes = vec![
            test_ingress_class("ngrok", "k8s.ngrok.com", true),
            test_ingress_class("ngrok-2", "k8s.ngrok.com", true),
        ];
        assert!(!is_owned(&classes, &ingress, "k8s.ngrok.com"));
    }

    #[test]
    fn test_explicit_class_must_exist() {
        let classes = vec![test_ingress_class("ngrok", TEST_CONTROLLER, true)];
        let ingress = simple_ingress("ns", "web", Some("missing"), "a.example.com", "svc", 80);
        assert!(!is_owned(&classes, &ingress, TEST_CONTROLLER));
    }

    #[test]
    fn test_legacy_class_annotation() {
        let classes = vec![
            test_ingress_class("ngrok", TEST_CONTROLLER, false),
            test_ingress_class("other", OTHER_CONTROLLER, false),
        ];
        let ours = annotate(
            simple_ingress("ns", "web", None, "a.example.com", "svc", 80),
            LEGACY_CLASS_ANNOTATION,
            "ngrok",
        );
        let theirs = annotate(
            simple_ingress("ns", "api", None, "b.example.com", "svc", 80),
            LEGACY_CLASS_ANNOTATION,
            "other",
        );
        assert_eq!(requested_class(&ours), Some("ngrok"));
        assert!(is_owned(&classes, &ours, TEST_CONTROLLER));
        assert!(!is_owned(&classes, &theirs, TEST_CONTROLLER));
    }

    #[test]
    fn test_spec_class_wins_over_legacy_annotation() {
        let ingress = annotate(
            simple_ingress("ns", "web", Some("ngrok"), "a.example.com", "svc", 80),
            LEGACY_CLASS_ANNOTATION,
            "other",
        );
        assert_eq!(requested_class(&ingress), Some("ngrok"));
    }

    #[test]
    fn test_owned_ingresses_follow_class_changes() {
        let store = ResourceStore::new();
        store.update_resource(simple_ingress("test", "no-class", None, "a.example.com", "a", 80));
        assert!(owned_ingresses(&store, TEST_CONTROLLER).is_empty());

        store.update_resource(test_ingress_class("ngrok", TEST_CONTROLLER, true));
        assert_eq!(owned_ingresses(&store, TEST_CONTROLLER).len(), 1);

        store.update_resource(test_ingress_class("ngrok", TEST_CONTROLLER, false));
        assert!(owned_ingresses(&store, TEST_CONTROLLER).is_empty());
    }

    #[test]
    fn test_owned_ingresses_are_ordered() {
        let store = ResourceStore::new();
        store.update_resource(test_ingress_class("ngrok", TEST_CONTROLLER, true));
        for (ns, name) in [("b", "x"), ("a", "z"), ("a", "y")] {
            store.update_resource(simple_ingress(ns, name, None, "a.example.com", "svc", 80));
        }
        let order: Vec<(String, String)> = owned_ingresses(&store, TEST_CONTROLLER)
            .iter()
            .map(|i| (i.namespace().unwrap_or_default(), i.name_any()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), "y".to_string()),
                ("a".to_string(), "z".to_string()),
                ("b".to_string(), "x".to_string()),
            ]
        );
    }
}
