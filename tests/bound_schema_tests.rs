use dynamap::{
    Binding, BoundType, InMemoryTables, InMemoryTemplateSource, Mapper, MapperConfig, MapperError,
    StackResolver, TypeRegistry, Value, attrs,
};
use serde_json::json;
use std::sync::Arc;

const ACCOUNT: &str = "billing.Account";

fn accounts_template() -> serde_json::Value {
    json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Resources": {
            "Accounts": {
                "Type": "AWS::DynamoDB::Table",
                "Properties": {
                    "KeySchema": [
                        { "AttributeName": "tenant", "KeyType": "HASH" },
                        { "AttributeName": "account_id", "KeyType": "RANGE" }
                    ],
                    "AttributeDefinitions": [
                        { "AttributeName": "tenant", "AttributeType": "S" },
                        { "AttributeName": "account_id", "AttributeType": "S" }
                    ],
                    "BillingMode": "PAY_PER_REQUEST"
                }
            },
            "Events": {
                "Type": "AWS::SQS::Queue",
                "Properties": {}
            }
        }
    })
}

struct Fixture {
    source: Arc<InMemoryTemplateSource>,
    resolver: Arc<StackResolver>,
    bound: Arc<BoundType>,
    mapper: Mapper,
    prod: Binding,
    staging: Binding,
}

fn fixture() -> Fixture {
    let source = Arc::new(InMemoryTemplateSource::new());
    source
        .put_stack(
            "prod",
            accounts_template(),
            &[("Accounts", "prod-Accounts-1A2B"), ("Events", "prod-Events-9Z")],
        )
        .unwrap();
    source
        .put_stack(
            "staging",
            accounts_template(),
            &[("Accounts", "staging-Accounts-3C4D")],
        )
        .unwrap();

    let resolver = Arc::new(StackResolver::new(source.clone()));
    let prod = Binding::new("prod", "Accounts");
    let staging = Binding::new("staging", "Accounts");

    let registry = Arc::new(TypeRegistry::new());
    let bound = registry
        .register_bound(
            BoundType::new(ACCOUNT, resolver.clone())
                .with_default_binding(prod.clone())
                .require("owner"),
        )
        .unwrap();

    let mapper = Mapper::new(Arc::new(InMemoryTables::new()))
        .with_registry(registry)
        .with_config(MapperConfig::new().app("billing").stage("test"));
    mapper.ensure_table((ACCOUNT, &prod)).unwrap();
    mapper.ensure_table((ACCOUNT, &staging)).unwrap();

    Fixture {
        source,
        resolver,
        bound,
        mapper,
        prod,
        staging,
    }
}

#[test]
fn test_bound_type_uses_physical_table() {
    let f = fixture();
    let prod_schema = f.mapper.schema((ACCOUNT, &f.prod)).unwrap();
    assert_eq!(prod_schema.table_name, "prod-Accounts-1A2B");
    assert_eq!(prod_schema.hash_key().unwrap(), "tenant");
    assert_eq!(prod_schema.range_key().unwrap(), Some("account_id"));

    // Default coordinates apply when none are given; namespacing does not.
    let default_schema = f.mapper.schema(ACCOUNT).unwrap();
    assert_eq!(default_schema.table_name, "prod-Accounts-1A2B");

    let staging_schema = f.mapper.schema((ACCOUNT, &f.staging)).unwrap();
    assert_eq!(staging_schema.table_name, "staging-Accounts-3C4D");
}

#[test]
fn test_templates_are_cached_per_stack() {
    let f = fixture();
    let template_calls = f.source.template_calls();
    let resource_calls = f.source.resource_calls();

    for i in 0..5 {
        let mut account = f
            .mapper
            .new_object(
                (ACCOUNT, &f.prod),
                attrs! { "tenant" => "acme", "account_id" => format!("a{}", i), "owner" => "ops" },
            )
            .unwrap();
        account.save().unwrap();
    }
    assert_eq!(f.source.template_calls(), template_calls);
    assert_eq!(f.source.resource_calls(), resource_calls);
    assert_eq!(template_calls, 2);

    // Dropping every cache forces one more fetch per stack.
    f.resolver.invalidate().unwrap();
    f.bound.invalidate_schemas().unwrap();
    f.mapper.schema((ACCOUNT, &f.prod)).unwrap();
    f.mapper.schema((ACCOUNT, &f.staging)).unwrap();
    assert_eq!(f.source.template_calls(), 4);

    let stats = f.resolver.stats();
    assert_eq!(stats.template_misses, 4);
}

#[test]
fn test_reference_carries_binding() {
    let f = fixture();
    let mut staged = f
        .mapper
        .new_object(
            (ACCOUNT, &f.staging),
            attrs! { "tenant" => "acme", "account_id" => "a1", "owner" => "qa" },
        )
        .unwrap();
    staged.save().unwrap();
    let mut live = f
        .mapper
        .new_object(
            (ACCOUNT, &f.prod),
            attrs! { "tenant" => "acme", "account_id" => "a1", "owner" => "ops" },
        )
        .unwrap();
    live.save().unwrap();

    let relation = staged.foreign_key().unwrap();
    assert_eq!(relation.type_name, ACCOUNT);
    assert_eq!(relation.binding, Some(f.staging.clone()));
    assert!(!staged.is_same(&live));

    let mut resolved = f.mapper.from_reference(&relation).unwrap();
    assert!(resolved.is_same(&staged));
    assert_eq!(
        resolved.schema().unwrap().table_name,
        "staging-Accounts-3C4D"
    );
    assert_eq!(resolved.get_value("owner").unwrap(), Some(Value::from("qa")));
}

#[test]
fn test_bound_required_attributes() {
    let f = fixture();
    let mut account = f
        .mapper
        .new_object(ACCOUNT, attrs! { "tenant" => "acme", "account_id" => "a9" })
        .unwrap();
    match account.save() {
        Err(MapperError::Validation(msg)) => assert!(msg.contains("owner"), "{}", msg),
        other => panic!("Expected Validation error, got {:?}", other),
    }
}

#[test]
fn test_binding_errors() {
    let f = fixture();

    let missing_stack = Binding::new("qa", "Accounts");
    match f.mapper.schema((ACCOUNT, &missing_stack)) {
        Err(MapperError::Configuration(msg)) => assert!(msg.contains("qa"), "{}", msg),
        other => panic!("Expected Configuration error, got {:?}", other),
    }

    let missing_resource = Binding::new("prod", "Ledger");
    assert!(matches!(
        f.mapper.schema((ACCOUNT, &missing_resource)),
        Err(MapperError::Configuration(_))
    ));

    let wrong_type = Binding::new("prod", "Events");
    match f.mapper.schema((ACCOUNT, &wrong_type)) {
        Err(MapperError::Configuration(msg)) => {
            assert!(msg.contains("AWS::SQS::Queue"), "{}", msg)
        }
        other => panic!("Expected Configuration error, got {:?}", other),
    }
}

#[test]
fn test_bound_type_without_coordinates() {
    let source = Arc::new(InMemoryTemplateSource::new());
    let resolver = Arc::new(StackResolver::new(source));
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register_bound(BoundType::new("billing.Invoice", resolver))
        .unwrap();
    let mapper = Mapper::new(Arc::new(InMemoryTables::new())).with_registry(registry);

    assert!(matches!(
        mapper.descriptor("billing.Invoice"),
        Err(MapperError::Configuration(_))
    ));
    assert!(matches!(
        mapper.descriptor("billing.Unknown"),
        Err(MapperError::UnknownType(_))
    ));
}
