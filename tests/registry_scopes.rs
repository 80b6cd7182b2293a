//! Registry scopes backed by prototype directories and configuration files

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tuplestore::core::{load_config, Config, RegistryConfig};
use tuplestore::registry::TypeRegistry;
use tuplestore::storage::JournalTable;
use tuplestore::tuple::{EditableTuple, Tuple};
use tuplestore::types::{Error, KeyTuple, TypeKind, Value};

fn write(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

const PARTY: &str = r#"
uri = "urn:shop:Party"

[[fields]]
name = "label"
type = "urn:builtin:string"
"#;

const CUSTOMER: &str = r#"
uri = "urn:shop:Customer"
base = "urn:shop:Party"

[[fields]]
name = "id"
type = "urn:builtin:int"

[[fields]]
name = "orders"
type = "urn:shop:Order.list"

[[keys]]
name = "pk"
fields = ["id"]
unique = true
"#;

const ORDER: &str = r#"
uri = "urn:shop:Order"

[[fields]]
name = "customer"
type = "urn:shop:Customer"

[[fields]]
name = "total"
type = "urn:builtin:float"
"#;

fn shop_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "party.toml", PARTY);
    write(dir.path(), "customer.toml", CUSTOMER);
    write(dir.path(), "order.toml", ORDER);
    dir
}

fn registry_for(dir: &Path) -> Arc<TypeRegistry> {
    let config = RegistryConfig {
        prototype_dirs: vec![dir.to_path_buf()],
        ..RegistryConfig::default()
    };
    TypeRegistry::root(&config).unwrap()
}

#[test]
fn mutually_recursive_prototypes_link() {
    let dir = shop_dir();
    let registry = registry_for(dir.path());

    let customer = registry.resolve("urn:shop:Customer").unwrap();
    let order = registry.resolve("urn:shop:Order").unwrap();
    let orders = registry.resolve("urn:shop:Order.list").unwrap();

    assert!(customer.is_linked());
    assert!(order.is_linked());
    assert_eq!(orders.kind(), TypeKind::List);
    assert!(Arc::ptr_eq(orders.content().unwrap(), &order));
    assert_eq!(customer.field_type(1), Some(orders.id()));
    assert_eq!(order.field_type(0), Some(customer.id()));
}

#[test]
fn records_of_derived_types_widen_to_their_base() {
    let dir = shop_dir();
    let registry = registry_for(dir.path());

    let mut record = registry.new_record("urn:shop:Customer").unwrap().to_mutable();
    record.set_by_name("id", Value::Int(7)).unwrap();
    let record = record.freeze();

    let party = registry.resolve("urn:shop:Party").unwrap();
    let extent = registry.widen(&record, &party).unwrap();
    assert_eq!(extent.field_set().owner(), Some("urn:shop:Party"));
    assert!(extent.get_by_name("label").unwrap().is_null());
    assert_eq!(record.get_by_name("id").unwrap(), Value::Int(7));
}

#[test]
fn plugin_scopes_share_parent_types_and_keep_local_ones() {
    let shop = shop_dir();
    let plugin_dir = TempDir::new().unwrap();
    write(
        plugin_dir.path(),
        "widgets/gauge.toml",
        "uri = \"file:widgets/gauge\"\n[[fields]]\nname = \"customer\"\ntype = \"urn:shop:Customer\"\n",
    );

    let root = registry_for(shop.path());
    let plugin = root
        .child_with_config(
            "plugin",
            &RegistryConfig {
                prototype_dirs: vec![plugin_dir.path().to_path_buf()],
                builtin_types: false,
                ..RegistryConfig::default()
            },
        )
        .unwrap();

    let gauge = plugin.resolve("file:widgets/gauge").unwrap();
    assert_eq!(gauge.id().scope(), plugin.scope());
    let customer = plugin.get(gauge.field_type(0).unwrap()).unwrap();
    assert!(Arc::ptr_eq(&customer, &root.resolve("urn:shop:Customer").unwrap()));

    assert!(matches!(root.resolve("file:widgets/gauge"), Err(Error::TypeNotFound { .. })));
}

#[test]
fn tables_follow_registry_types() {
    let dir = shop_dir();
    let config = Config::default();
    let registry = registry_for(dir.path());
    let customer = registry.resolve("urn:shop:Customer").unwrap();

    let mut table = JournalTable::for_type(&customer, &config.journal).unwrap();
    let mut record = customer.new_record().unwrap().to_mutable();
    record.set_by_name("id", Value::Int(1)).unwrap();
    let v0 = table.insert(&record).unwrap();

    let mut delta = v0.edit();
    delta.set_by_name("id", Value::Int(2)).unwrap();
    table.update(&v0, delta).unwrap();

    assert!(table.get_one("pk", &KeyTuple::single(1)).unwrap().is_none());
    assert_eq!(table.get("pk", &KeyTuple::single(2)).unwrap().len(), 1);

    let int = registry.resolve("urn:builtin:int").unwrap();
    assert!(JournalTable::for_type(&int, &config.journal).is_err());
}

#[test]
fn configuration_files_drive_registry_setup() {
    let shop = shop_dir();
    let config_dir = TempDir::new().unwrap();
    let config_path = config_dir.path().join("tuplestore.toml");
    fs::write(
        &config_path,
        format!(
            "[registry]\nprototype_dirs = [{:?}]\n\n[journal]\nwait_timeout_ms = 50\n",
            shop.path().display().to_string()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.journal.wait_timeout_ms, Some(50));
    let registry = TypeRegistry::root(&config.registry).unwrap();
    assert!(registry.resolve("urn:shop:Order").is_ok());

    fs::write(&config_path, "[journal]\nwait_timeout_ms = 0\n").unwrap();
    assert!(matches!(load_config(&config_path), Err(Error::Config(_))));
}
