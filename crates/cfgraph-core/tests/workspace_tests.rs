//! End-to-end tests for building and resolving workspaces

use std::sync::Arc;

use cfgraph_core::{
    Branch, CacheMode, ConfigItemSchema, ConfigLoadError, EngineOptions, FailureKind, NodePhase, OverrideKind,
    OverrideSource, OverrideStack, PickKeys, PickSpec, PluginDeclaration, PluginInputSchema,
    ResolutionError, Resolver, SchemaError, ServiceConfigSchema, ServiceDefinition, Workspace,
    WorkspaceBuilder,
};
use cfgraph_test_utils::{RecordingCache, TablePlugin, counting_resolver, item, root, service};
use cfgraph_types::builtins::string;
use cfgraph_types::{DataType, TypeFactory};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

async fn resolved(builder: WorkspaceBuilder) -> Workspace {
    let mut workspace = builder.build();
    workspace.resolve().await.expect("resolution should not fail on I/O");
    workspace
}

/// A sensitive string type registered under `api-token`.
fn api_token_type() -> TypeFactory {
    TypeFactory::new("api-token", |settings| {
        let parent = Arc::new(string::build(settings)?);
        Ok(DataType::builder("api-token")
            .extends(parent)
            .sensitive(true)
            .build())
    })
}

mod graph_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cycle_members_are_reported_and_skipped() {
        // a's parent is b, b picks from c, c picks from a
        let ws = resolved(
            WorkspaceBuilder::new()
                .service(root("root", [("SHARED", item("s"))]))
                .service(service("a", ServiceConfigSchema::new().parent("b"), [("A1", item("a"))]))
                .service(service(
                    "b",
                    ServiceConfigSchema::new().pick(PickSpec::new("C1").from_service("c")),
                    [("B1", item("b"))],
                ))
                .service(service(
                    "c",
                    ServiceConfigSchema::new().pick(PickSpec::new("A1").from_service("a")),
                    [("C1", item("c"))],
                ))
                .service(service("d", ServiceConfigSchema::new(), [("D1", item("d"))])),
        )
        .await;

        let expected = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        for name in ["a", "b", "c"] {
            let svc = ws.service(name).unwrap();
            assert!(
                svc.schema_errors().contains(&SchemaError::DependencyCycle {
                    members: expected.clone()
                }),
                "{} should carry the cycle error, got {:?}",
                name,
                svc.schema_errors()
            );
            assert!(!svc.is_valid());
        }
        assert_eq!(ws.graph().cycle_of("b"), Some(expected.as_slice()));
        assert_eq!(ws.graph().topological_order(), ["root", "d"]);

        assert_eq!(ws.value("a", "A1"), None);
        assert!(!ws.service("a").unwrap().node("A1").unwrap().is_resolved());
        assert_eq!(ws.value("d", "D1"), Some(&json!("d")));
        assert!(ws.service("d").unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_pick_from_cycle_member_is_a_resolution_error() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .service(root("root", [("SHARED", item("s"))]))
                .service(service(
                    "a",
                    ServiceConfigSchema::new().pick(PickSpec::new("B1").from_service("b")),
                    [("A1", item("a"))],
                ))
                .service(service(
                    "b",
                    ServiceConfigSchema::new().pick(PickSpec::new("A1").from_service("a")),
                    [("B1", item("b"))],
                ))
                .service(service(
                    "down",
                    ServiceConfigSchema::new().pick(PickSpec::new("A1").from_service("a")),
                    [("OWN", item("own"))],
                )),
        )
        .await;

        let down = ws.service("down").unwrap();
        assert!(down.schema_errors().is_empty(), "got {:?}", down.schema_errors());
        assert_eq!(
            down.node("A1").unwrap().resolution_error(),
            Some(&ResolutionError::PickedValueUnresolved {
                service: "a".into(),
                key: "A1".into(),
            })
        );
        assert_eq!(ws.value("down", "OWN"), Some(&json!("own")));
    }

    #[tokio::test]
    async fn test_services_resolve_after_their_pick_sources() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .service(ServiceDefinition::root("root", ServiceConfigSchema::new()))
                .service(ServiceDefinition::new(
                    "api",
                    ServiceConfigSchema::new()
                        .pick(PickSpec::new(PickKeys::filter(|k| k.starts_with("DB_"))).from_service("db")),
                ))
                .service(service(
                    "db",
                    ServiceConfigSchema::new(),
                    [("DB_HOST", item("localhost")), ("DB_PORT", item(5432)), ("OTHER", item(true))],
                )),
        )
        .await;

        assert_eq!(ws.graph().topological_order(), ["root", "db", "api"]);
        let api = ws.service("api").unwrap();
        assert_eq!(api.nodes().keys().collect::<Vec<_>>(), vec!["DB_HOST", "DB_PORT"]);
        assert_eq!(ws.value("api", "DB_PORT"), Some(&json!(5432)));
    }

    #[tokio::test]
    async fn test_pick_of_failed_item_is_a_resolution_error() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .service(root(
                    "root",
                    [("PORT", ConfigItemSchema::new().extends("port").value(Resolver::static_value("abc")))],
                ))
                .service(service(
                    "api",
                    ServiceConfigSchema::new().pick(PickSpec::new("PORT")),
                    [("NAME", item("api"))],
                )),
        )
        .await;

        let picked = ws.service("api").unwrap().node("PORT").unwrap();
        assert_eq!(
            picked.resolution_error(),
            Some(&ResolutionError::PickedValueUnresolved {
                service: "root".into(),
                key: "PORT".into(),
            })
        );
        // siblings are unaffected
        assert_eq!(ws.value("api", "NAME"), Some(&json!("api")));
    }

    #[test]
    fn test_pick_of_unknown_item_is_a_schema_error() {
        let ws = WorkspaceBuilder::new()
            .service(root("root", [("A", item("a"))]))
            .service(ServiceDefinition::new("api", ServiceConfigSchema::new().pick(PickSpec::new("B"))))
            .build();

        assert_eq!(
            ws.service("api").unwrap().schema_errors(),
            [SchemaError::MissingPickedItem {
                service: "root".into(),
                key: "B".into(),
            }]
        );
    }
}

mod resolution_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tier_schema() -> ServiceDefinition {
        root(
            "root",
            [(
                "TIER",
                ConfigItemSchema::new().value(Resolver::switch_by_environment([
                    ("dev", Resolver::static_value("x")),
                    ("_default", Resolver::static_value("y")),
                ])),
            )],
        )
    }

    #[tokio::test]
    async fn test_branch_follows_environment() {
        let dev = resolved(
            WorkspaceBuilder::new()
                .options(EngineOptions::default().with_environment("dev"))
                .service(tier_schema()),
        )
        .await;
        let prod = resolved(
            WorkspaceBuilder::new()
                .options(EngineOptions::default().with_environment("prod"))
                .service(tier_schema()),
        )
        .await;

        assert_eq!(dev.value("root", "TIER"), Some(&json!("x")));
        assert_eq!(prod.value("root", "TIER"), Some(&json!("y")));
        assert_eq!(
            prod.service("root").unwrap().node("TIER").unwrap().resolver().branch_path(),
            Some("_default")
        );
    }

    #[tokio::test]
    async fn test_switch_declared_before_its_key() {
        let ws = resolved(WorkspaceBuilder::new().service(root(
            "root",
            [
                (
                    "MODE",
                    ConfigItemSchema::new().value(Resolver::switch_by("APP_ENV", [("dev", "x"), ("_default", "y")])),
                ),
                ("APP_ENV", item("dev")),
            ],
        )))
        .await;

        assert_eq!(ws.value("root", "MODE"), Some(&json!("x")));
        let root = ws.service("root").unwrap();
        assert_eq!(root.nodes().keys().collect::<Vec<_>>(), vec!["MODE", "APP_ENV"]);
        assert_eq!(root.node("MODE").unwrap().resolver().branch_path(), Some("dev"));
    }

    #[tokio::test]
    async fn test_panicking_resolver_fails_only_its_item() {
        let ws = resolved(WorkspaceBuilder::new().service(root(
            "root",
            [
                (
                    "BAD",
                    ConfigItemSchema::new().value(Resolver::from_sync_fn(|_| -> Result<Value, cfgraph_core::BoxError> {
                        panic!("user bug")
                    })),
                ),
                ("OK", item("fine")),
            ],
        )))
        .await;

        let bad = ws.service("root").unwrap().node("BAD").unwrap();
        assert_eq!(bad.phase(), NodePhase::Errored);
        assert_eq!(
            bad.resolution_error(),
            Some(&ResolutionError::Failed {
                message: "panicked: user bug".into()
            })
        );
        assert_eq!(ws.value("root", "OK"), Some(&json!("fine")));
    }

    #[tokio::test]
    async fn test_branch_without_default_fails() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .options(EngineOptions::default().with_environment("prod"))
                .service(root(
                    "root",
                    [(
                        "TIER",
                        ConfigItemSchema::new().value(Resolver::branches(vec![Branch::when(
                            "dev",
                            |ctx| ctx.environment() == Some("dev"),
                            "x",
                        )])),
                    )],
                )),
        )
        .await;

        let node = ws.service("root").unwrap().node("TIER").unwrap();
        assert_eq!(node.resolution_error(), Some(&ResolutionError::NoMatchingBranch));
        assert_eq!(node.phase(), NodePhase::Errored);
    }

    #[tokio::test]
    async fn test_cached_value_is_reused_across_builds() {
        let cache = Arc::new(RecordingCache::new());
        let (resolver, calls) = counting_resolver("token-1");
        let definition = || {
            root(
                "root",
                [("TOKEN", ConfigItemSchema::new().value(resolver.clone().with_cache_key("token")))],
            )
        };

        let first = resolved(WorkspaceBuilder::new().cache(cache.clone()).service(definition())).await;
        let second = resolved(WorkspaceBuilder::new().cache(cache.clone()).service(definition())).await;

        assert_eq!(calls.get(), 1);
        assert_eq!(cache.sets(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(second.value("root", "TOKEN"), Some(&json!("token-1")));
        assert!(!first.service("root").unwrap().node("TOKEN").unwrap().resolver().is_using_cache());
        assert!(second.service("root").unwrap().node("TOKEN").unwrap().resolver().is_using_cache());
    }

    #[tokio::test]
    async fn test_skip_cache_always_recomputes() {
        let cache = Arc::new(RecordingCache::new());
        let (resolver, calls) = counting_resolver(1);
        let options = EngineOptions::default().with_cache_mode(CacheMode::Skip);
        for _ in 0..2 {
            resolved(
                WorkspaceBuilder::new()
                    .cache(cache.clone())
                    .options(options.clone())
                    .service(root(
                        "root",
                        [("N", ConfigItemSchema::new().value(resolver.clone().with_cache_key("n")))],
                    )),
            )
            .await;
        }
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.gets(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_leaves_everything_else_resolved() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .service(root(
                    "root",
                    [
                        ("PORT", ConfigItemSchema::new().extends("port").value(Resolver::static_value("99999"))),
                        ("NAME", item("root")),
                    ],
                ))
                .service(service("api", ServiceConfigSchema::new(), [("URL", item("http://api"))])),
        )
        .await;

        assert!(!ws.is_valid());
        assert!(ws.service("api").unwrap().is_valid());
        assert_eq!(ws.value("root", "NAME"), Some(&json!("root")));

        let port = ws.service("root").unwrap().node("PORT").unwrap();
        assert!(port.is_resolved());
        assert!(!port.is_valid());
        assert_eq!(port.resolved_value(), Some(&json!(99999)));

        let failures = ws.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].service, "root");
        assert_eq!(failures[0].item.as_deref(), Some("PORT"));
        assert_eq!(failures[0].kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_resolver_error_is_recorded_on_node() {
        let ws = resolved(WorkspaceBuilder::new().service(root(
            "root",
            [(
                "BROKEN",
                ConfigItemSchema::new().value(Resolver::from_sync_fn(|_| {
                    Err::<Value, _>("backend offline".into())
                })),
            )],
        )))
        .await;

        let node = ws.service("root").unwrap().node("BROKEN").unwrap();
        assert_eq!(
            node.resolution_error(),
            Some(&ResolutionError::Failed {
                message: "backend offline".into()
            })
        );
    }
}

mod override_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stack() -> OverrideStack {
        OverrideStack::new()
            .with_source(
                OverrideSource::from_json(OverrideKind::File, ".env.production", json!({"HOST": "prod-host"}))
                    .unwrap()
                    .with_precedence(20)
                    .enabled_when("production"),
            )
            .with_source(
                OverrideSource::from_env_vars("process", [("APP_HOST", "env-host")]).with_precedence(10),
            )
            .with_source(
                OverrideSource::from_json(OverrideKind::File, ".env", json!({"HOST": "file-host"}))
                    .unwrap(),
            )
    }

    fn host_service() -> ServiceDefinition {
        root(
            "root",
            [(
                "HOST",
                ConfigItemSchema::new()
                    .import_env_key("APP_HOST")
                    .value(Resolver::static_value("default-host")),
            )],
        )
    }

    #[tokio::test]
    async fn test_highest_enabled_source_wins() {
        let production = resolved(
            WorkspaceBuilder::new()
                .options(EngineOptions::default().with_environment("production"))
                .overrides("root", stack())
                .service(host_service()),
        )
        .await;
        let dev = resolved(
            WorkspaceBuilder::new()
                .options(EngineOptions::default().with_environment("dev"))
                .overrides("root", stack())
                .service(host_service()),
        )
        .await;

        assert_eq!(production.value("root", "HOST"), Some(&json!("prod-host")));
        // the production source is disabled, so the next one applies
        assert_eq!(dev.value("root", "HOST"), Some(&json!("env-host")));

        let node = dev.service("root").unwrap().node("HOST").unwrap();
        let labels: Vec<&str> = node.overrides().iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["process", ".env"]);
    }

    #[tokio::test]
    async fn test_no_override_falls_back_to_resolver() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .overrides("root", OverrideStack::new())
                .service(host_service()),
        )
        .await;
        assert_eq!(ws.value("root", "HOST"), Some(&json!("default-host")));
    }

    #[tokio::test]
    async fn test_override_values_are_coerced() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .overrides(
                    "root",
                    OverrideStack::new().with_source(OverrideSource::from_env_vars("process", [("PORT", "3000")])),
                )
                .service(root(
                    "root",
                    [("PORT", ConfigItemSchema::new().extends("port").value(Resolver::static_value(80)))],
                )),
        )
        .await;
        let node = ws.service("root").unwrap().node("PORT").unwrap();
        assert_eq!(node.resolved_raw_value(), Some(&json!("3000")));
        assert_eq!(node.resolved_value(), Some(&json!(3000)));
    }
}

mod plugin_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vault() -> Arc<TablePlugin> {
        Arc::new(
            TablePlugin::new("vault")
                .input("token", PluginInputSchema::required().extends("api-token"))
                .entry("db-password", "hunter2"),
        )
    }

    #[tokio::test]
    async fn test_type_injection_binds_only_matching_type() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .register_type(api_token_type())
                .service(ServiceDefinition::root(
                    "root",
                    ServiceConfigSchema::new()
                        .plugin(PluginDeclaration::new("vault", vault()))
                        .item("UNRELATED", item("not-a-token"))
                        .item("TOKEN", ConfigItemSchema::new().extends("api-token").value(Resolver::static_value("tok-123"))),
                ))
                .service(ServiceDefinition::new(
                    "api",
                    ServiceConfigSchema::new()
                        .inject_plugin("vault")
                        .item("DB_PASSWORD", ConfigItemSchema::new().value(Resolver::from_plugin("vault", "db-password"))),
                )),
        )
        .await;

        let plugin = ws.plugins().get("vault").unwrap();
        assert!(plugin.is_valid());
        let token = &plugin.inputs()["token"];
        assert_eq!(token.resolved_value, Some(json!("tok-123")));
        assert_eq!(token.bound_from.as_deref(), Some("root.TOKEN"));

        assert_eq!(ws.value("api", "DB_PASSWORD"), Some(&json!("hunter2;token=tok-123")));
        assert!(ws.is_valid());
    }

    #[tokio::test]
    async fn test_plugin_without_inputs_is_not_ready() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .register_type(api_token_type())
                .service(ServiceDefinition::root(
                    "root",
                    ServiceConfigSchema::new()
                        .plugin(PluginDeclaration::new("vault", vault()))
                        .item("DB_PASSWORD", ConfigItemSchema::new().value(Resolver::from_plugin("vault", "db-password"))),
                )),
        )
        .await;

        let node = ws.service("root").unwrap().node("DB_PASSWORD").unwrap();
        assert_eq!(
            node.resolution_error(),
            Some(&ResolutionError::PluginNotReady {
                instance_id: "vault".into(),
                missing: vec!["token".into()],
            })
        );
        let kinds: Vec<FailureKind> = ws.failures().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::Resolution, FailureKind::Plugin]);
    }

    #[tokio::test]
    async fn test_path_reference_requeues_until_target_initialized() {
        // "a" is declared before its parent "b", which owns the referenced item
        let ws = resolved(
            WorkspaceBuilder::new()
                .register_type(api_token_type())
                .service(ServiceDefinition::root("root", ServiceConfigSchema::new()))
                .service(ServiceDefinition::new(
                    "a",
                    ServiceConfigSchema::new()
                        .parent("b")
                        .plugin(PluginDeclaration::new("vault", vault()).with_path("token", "b.TOKEN"))
                        .item("SECRET", ConfigItemSchema::new().value(Resolver::from_plugin("vault", "db-password"))),
                ))
                .service(service("b", ServiceConfigSchema::new(), [("TOKEN", item("tok-b"))])),
        )
        .await;

        let outcome = ws.init_outcome();
        assert_eq!(outcome.initialized, vec!["root", "b", "a"]);
        assert_eq!(outcome.attempts["a"], 2);
        assert_eq!(outcome.batches, 2);
        assert_eq!(ws.value("a", "SECRET"), Some(&json!("hunter2;token=tok-b")));
    }

    #[test]
    fn test_missing_injection_target_stops_without_progress() {
        let ws = WorkspaceBuilder::new()
            .service(ServiceDefinition::root("root", ServiceConfigSchema::new()))
            .service(ServiceDefinition::new(
                "api",
                ServiceConfigSchema::new().inject_plugin("nowhere"),
            ))
            .build();

        let outcome = ws.init_outcome();
        assert_eq!(outcome.batches, 2);
        assert_eq!(
            ws.service("api").unwrap().schema_errors(),
            [SchemaError::InjectionTargetMissing {
                target: "nowhere".into()
            }]
        );
    }

    #[test]
    fn test_plugin_is_not_registered_while_its_service_waits() {
        let ws = WorkspaceBuilder::new()
            .register_type(api_token_type())
            .service(ServiceDefinition::root(
                "root",
                ServiceConfigSchema::new()
                    .plugin(PluginDeclaration::new("vault", vault()).with_path("token", "ghost.TOKEN")),
            ))
            .build();

        assert!(ws.plugins().get("vault").is_none());
        assert!(ws.plugins().is_empty());
        assert_eq!(
            ws.service("root").unwrap().schema_errors(),
            [SchemaError::InjectionTargetMissing {
                target: "ghost.TOKEN".into()
            }]
        );
    }

    #[test]
    fn test_duplicate_plugin_instance_is_hard_failure() {
        let ws = WorkspaceBuilder::new()
            .register_type(api_token_type())
            .service(ServiceDefinition::root(
                "root",
                ServiceConfigSchema::new().plugin(PluginDeclaration::new("vault", vault())),
            ))
            .service(ServiceDefinition::new(
                "api",
                ServiceConfigSchema::new().plugin(PluginDeclaration::new("vault", vault())),
            ))
            .build();

        assert_eq!(ws.init_outcome().attempts["api"], 1);
        assert!(matches!(
            ws.service("api").unwrap().schema_errors(),
            [SchemaError::DuplicatePlugin { .. }]
        ));
    }
}

mod output_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secrets() -> WorkspaceBuilder {
        WorkspaceBuilder::new().service(root(
            "root",
            [
                (
                    "API_KEY",
                    ConfigItemSchema::new()
                        .sensitive(true)
                        .export_env_key("SERVICE_API_KEY")
                        .value(Resolver::static_value("sk_live_0123456789")),
                ),
                ("PORT", ConfigItemSchema::new().extends("port").value(Resolver::static_value("8080"))),
                ("EMPTY", ConfigItemSchema::new()),
            ],
        ))
    }

    #[tokio::test]
    async fn test_env_injection_shape() {
        let ws = resolved(secrets()).await;
        let env = ws.env_for_service("root").unwrap();

        assert_eq!(env.keys().collect::<Vec<_>>(), vec!["EMPTY", "PORT", "SERVICE_API_KEY"]);
        let key = &env["SERVICE_API_KEY"];
        assert!(key.sensitive);
        assert_eq!(key.value.as_deref(), Some("sk_live_0123456789"));
        assert!(!key.to_string().contains("live"));
        assert_eq!(env["PORT"].value.as_deref(), Some("8080"));
        assert_eq!(env["EMPTY"].value, None);
    }

    #[tokio::test]
    async fn test_serialized_workspace_shape() {
        let ws = resolved(secrets()).await;
        let json = ws.to_serialized().to_json().unwrap();

        let service = &json["services"]["root"];
        assert_eq!(service["serviceName"], "root");
        assert_eq!(service["isValid"], true);
        assert!(service.get("schemaErrors").is_none());

        let port = &service["config"]["PORT"];
        assert_eq!(port["resolvedRawValue"], "8080");
        assert_eq!(port["resolvedValue"], 8080);
        assert_eq!(port["isUsingCache"], false);
        assert_eq!(port["dataType"]["typeLabel"], "port");
        assert_eq!(service["config"]["API_KEY"]["resolvedValue"], "sk_live_0123456789");
    }

    #[tokio::test]
    async fn test_redacted_serialization_masks_sensitive_values() {
        let ws = resolved(secrets()).await;
        let json = ws.to_serialized_redacted().to_json().unwrap();
        let rendered = json.to_string();

        assert!(!rendered.contains("sk_live_0123456789"));
        assert_eq!(json["services"]["root"]["config"]["PORT"]["resolvedValue"], 8080);
    }

    #[tokio::test]
    async fn test_config_load_error_is_reported() {
        let ws = resolved(
            WorkspaceBuilder::new()
                .service(root("root", [("A", item("a"))]))
                .service(ServiceDefinition::failed(
                    "broken",
                    ConfigLoadError::new("unexpected token").at("services/broken/config.toml"),
                )),
        )
        .await;

        assert_eq!(ws.value("root", "A"), Some(&json!("a")));
        let failures = ws.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::ConfigLoad);

        let json = ws.to_serialized().to_json().unwrap();
        let err = &json["services"]["broken"]["configLoadError"];
        assert_eq!(err["type"], "ConfigLoadError");
    }
}
