mod common;

use common::{BOOK, USER, mapper, mapper_with};
use dynamap::{
    InMemoryTables, Item, LoadState, Mapper, MapperConfig, MapperError, PersistentObject, Result,
    Schema, TableGateway, TypeDescriptor, TypeRegistry, VERSION_ATTR, Value, attrs,
};
use std::sync::Arc;

const PERSON: &str = "hr.Person";

fn text(object: &mut PersistentObject, name: &str) -> Result<String> {
    Ok(object
        .get_value(name)?
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default())
}

fn people_mapper() -> (Arc<InMemoryTables>, Mapper) {
    let registry = Arc::new(TypeRegistry::new());
    let person = registry
        .register(TypeDescriptor::new(PERSON, Schema::new("people", "id")))
        .unwrap();
    person
        .compounds()
        .add("full_name", true, |object| {
            Ok(Value::from(format!(
                "{} {}",
                text(object, "first")?,
                text(object, "last")?
            )))
        })
        .unwrap();
    person
        .compounds()
        .add("initials", false, |object| {
            let initials: String = [text(object, "first")?, text(object, "last")?]
                .iter()
                .filter_map(|part| part.chars().next())
                .collect();
            Ok(Value::from(initials))
        })
        .unwrap();

    let tables = Arc::new(InMemoryTables::new());
    let mapper = Mapper::new(tables.clone()).with_registry(registry);
    mapper.ensure_table(PERSON).unwrap();
    (tables, mapper)
}

#[test]
fn test_compound_attributes() {
    let (tables, mapper) = people_mapper();
    let mut person = mapper
        .new_object(PERSON, attrs! { "id" => 1, "first" => "Grace", "last" => "Hopper" })
        .unwrap();
    assert_eq!(
        person.get_value("full_name").unwrap(),
        Some(Value::from("Grace Hopper"))
    );
    assert_eq!(person.get_value("initials").unwrap(), Some(Value::from("GH")));
    person.save().unwrap();

    let stored = tables.get_item("people", &attrs! { "id" => 1 }).unwrap().unwrap();
    assert_eq!(stored["full_name"], Value::from("Grace Hopper"));
    assert!(!stored.contains_key("initials"));

    // A stored compound value shadows the function until the field is deleted.
    let mut loaded = mapper.load(PERSON, attrs! { "id" => 1 }).unwrap().unwrap();
    loaded.set("first", "Amazing").unwrap();
    assert_eq!(
        loaded.get_value("full_name").unwrap(),
        Some(Value::from("Grace Hopper"))
    );
    loaded.delete("full_name").unwrap();
    assert_eq!(
        loaded.get_value("full_name").unwrap(),
        Some(Value::from("Amazing Hopper"))
    );
    loaded.save().unwrap();

    let stored = tables.get_item("people", &attrs! { "id" => 1 }).unwrap().unwrap();
    assert_eq!(stored["full_name"], Value::from("Amazing Hopper"));
}

#[test]
fn test_compound_names_are_checked() {
    let (_, mapper) = people_mapper();
    let person = mapper.descriptor(PERSON).unwrap();
    for name in ["_hidden", "dynamap_x", "x_dynamap", "a_dynamap_b"] {
        match person.compounds().add(name, false, |_| Ok(Value::Null)) {
            Err(MapperError::Validation(msg)) => assert!(msg.contains(name), "{}", msg),
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }
    assert_eq!(
        person.compounds().names().unwrap(),
        vec!["full_name".to_string(), "initials".to_string()]
    );
}

#[test]
fn test_missing_attributes_and_strict_mode() {
    let mut lenient = mapper()
        .new_object(USER, attrs! { "email" => "lee@example.com", "name" => "Lee" })
        .unwrap();
    assert!(lenient.get("shoe_size").unwrap().is_none());

    let strict = mapper_with(
        Arc::new(InMemoryTables::new()),
        MapperConfig::new().strict_attributes(true),
    );
    let mut user = strict
        .new_object(USER, attrs! { "email" => "lee@example.com", "name" => "Lee" })
        .unwrap();
    match user.get("shoe_size") {
        Err(MapperError::MissingAttribute(name)) => assert_eq!(name, "shoe_size"),
        other => panic!("Expected MissingAttribute, got {:?}", other),
    }
    assert_eq!(user.get_value("name").unwrap(), Some(Value::from("Lee")));
}

#[test]
fn test_version_attribute_is_hidden() {
    let mapper = mapper();
    let mut user = mapper
        .new_object(USER, attrs! { "email" => "max@example.com", "name" => "Max" })
        .unwrap();
    user.save().unwrap();

    assert_eq!(user.get_value(VERSION_ATTR).unwrap(), Some(Value::Int(1)));
    assert!(!user.fields().unwrap().contains(&VERSION_ATTR.to_string()));
    let view = user.save_view().unwrap();
    assert!(!view.contains_key(VERSION_ATTR));
    let json = user.to_json().unwrap();
    assert!(json.get(VERSION_ATTR).is_none());
}

#[test]
fn test_namespaced_tables() {
    let tables = Arc::new(InMemoryTables::new());
    let mapper = mapper_with(tables.clone(), MapperConfig::new().app("shop").stage("dev"));
    assert_eq!(
        mapper.schema(USER).unwrap().table_name,
        "users_shop_dev"
    );

    let mut user = mapper
        .new_object(USER, attrs! { "email" => "ned@example.com", "name" => "Ned" })
        .unwrap();
    user.save().unwrap();
    assert_eq!(tables.row_count("users_shop_dev").unwrap(), 1);
    assert!(tables.list_tables().unwrap().contains(&"books_shop_dev".to_string()));
    assert!(!mapper.ensure_table(BOOK).unwrap());
}

#[test]
fn test_reload_of_vanished_row() {
    let tables = Arc::new(InMemoryTables::new());
    let mapper = mapper_with(tables.clone(), MapperConfig::new());
    let mut user = mapper
        .new_object(
            USER,
            attrs! { "email" => "oz@example.com", "name" => "Oz", "city" => "Emerald" },
        )
        .unwrap();
    user.save().unwrap();

    let mut other = mapper
        .load(USER, attrs! { "email" => "oz@example.com" })
        .unwrap()
        .unwrap();
    other.delete_item(None).unwrap();

    assert!(!user.reload().unwrap());
    assert!(!user.in_db());
    assert_eq!(user.version(), 0);
    assert_eq!(user.load_state(), LoadState::Resolved);
    assert_eq!(user.fields().unwrap(), vec!["email".to_string()]);
}

#[test]
fn test_stub_resolves_lazily() {
    let tables = Arc::new(InMemoryTables::new());
    let mapper = mapper_with(tables.clone(), MapperConfig::new());
    let mut user = mapper
        .new_object(USER, attrs! { "email" => "pam@example.com", "name" => "Pam" })
        .unwrap();
    user.save().unwrap();

    let mut stub = mapper.resolve_reference(&user.reference().unwrap()).unwrap().unwrap();
    assert_eq!(stub.load_state(), LoadState::Unresolved);
    assert_eq!(stub.key().unwrap(), attrs! { "email" => "pam@example.com" });
    assert_eq!(stub.load_state(), LoadState::Unresolved);

    stub.set("name", "Pamela").unwrap();
    assert_eq!(stub.load_state(), LoadState::Resolved);
    assert_eq!(stub.version(), 1);
    stub.update().unwrap();
    assert_eq!(stub.version(), 2);
}

#[test]
fn test_reregistering_replaces_type() {
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(TypeDescriptor::new("app.Thing", Schema::new("things", "id")))
        .unwrap();
    registry
        .register(TypeDescriptor::new("app.Thing", Schema::new("things_v2", "uid")))
        .unwrap();
    let mapper = Mapper::new(Arc::new(InMemoryTables::new())).with_registry(registry.clone());

    let schema = mapper.schema("app.Thing").unwrap();
    assert_eq!(schema.table_name, "things_v2");
    assert_eq!(schema.hash_key().unwrap(), "uid");

    assert!(registry.unregister("app.Thing").unwrap());
    assert!(!registry.contains("app.Thing").unwrap());
}

#[test]
fn test_floats_and_timestamps_are_stored_as_text() {
    let tables = Arc::new(InMemoryTables::new());
    let mapper = mapper_with(tables.clone(), MapperConfig::new());
    let when = chrono::DateTime::parse_from_rfc3339("2024-05-06T07:08:09.123456Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let mut user = mapper
        .new_object(
            USER,
            attrs! { "email" => "quin@example.com", "name" => "Quin", "score" => 0.1, "joined" => when },
        )
        .unwrap();
    user.save().unwrap();

    let key: Item = attrs! { "email" => "quin@example.com" };
    let stored = tables.get_item("users", &key).unwrap().unwrap();
    assert_eq!(stored["score"], Value::Decimal("0.1".to_string()));
    assert_eq!(
        stored["joined"],
        Value::from("datetime:2024-05-06T07:08:09.123456Z")
    );

    let mut loaded = mapper.load(USER, key).unwrap().unwrap();
    assert_eq!(loaded.get_value("joined").unwrap(), Some(Value::Timestamp(when)));

    user.set("score", f64::NAN).unwrap();
    assert!(matches!(user.save(), Err(MapperError::Validation(_))));
    assert_eq!(user.version(), 1);
}
