use super::*;
use crate::tuple::{JournalTuple, ValueTuple};
use crate::types::{FnProjection, Value};

fn scheme() -> Arc<FieldSet> {
    FieldSet::builder(Some("urn:x:Person"))
        .field("id", "urn:builtin:int")
        .field("city", "urn:builtin:string")
        .key("pk", &["id"], true)
        .key("by_city", &["city"], false)
        .build()
        .unwrap()
}

fn person(id: i64, city: &str) -> Arc<dyn Tuple> {
    Arc::new(ValueTuple::from_pairs(scheme(), &[("id", id.into()), ("city", city.into())]).unwrap())
}

fn city(name: &str) -> KeyTuple {
    KeyTuple::single(name)
}

#[test]
fn indices_are_built_lazily_and_cached() {
    let agg = Aggregate::new(scheme(), vec![person(1, "Oslo"), person(2, "Rome"), person(3, "Oslo")]).unwrap();
    let by_city = agg.key("by_city").unwrap();

    assert!(agg.get_index(&by_city, false).unwrap().is_none());
    let first = agg.get_index(&by_city, true).unwrap().unwrap();
    let second = agg.get_index(&by_city, false).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.len(), 2);
}

#[test]
fn get_returns_subset_in_order() {
    let a = person(1, "Oslo");
    let c = person(3, "Oslo");
    let agg = Aggregate::new(scheme(), vec![Arc::clone(&a), person(2, "Rome"), Arc::clone(&c)]).unwrap();
    let by_city = agg.key("by_city").unwrap();

    let oslo = agg.get(&by_city, &city("Oslo")).unwrap();
    assert_eq!(oslo.len(), 2);
    assert!(Arc::ptr_eq(oslo.at(0).unwrap(), &a));
    assert!(Arc::ptr_eq(oslo.at(1).unwrap(), &c));
    assert!(agg.get(&by_city, &city("Paris")).unwrap().is_empty());

    let pk = agg.key("pk").unwrap();
    let two = agg.get_one(&pk, &KeyTuple::single(2)).unwrap().unwrap();
    assert_eq!(two.get(1).unwrap(), Value::text("Rome"));
}

#[test]
fn mismatched_elements_are_rejected() {
    let other = FieldSet::builder(Some("urn:x:Other"))
        .field("x", "urn:builtin:int")
        .build()
        .unwrap();
    let stray: Arc<dyn Tuple> = Arc::new(ValueTuple::empty(other));
    assert!(matches!(
        Aggregate::new(scheme(), vec![stray]),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn every_element_is_found_under_its_key_until_removed() {
    let mut agg = EditableAggregate::new(scheme());
    let pk = agg.key("pk").unwrap();
    agg.get_index(&pk, true).unwrap();

    let people: Vec<_> = (0..10).map(|i| person(i, "X")).collect();
    for p in &people {
        agg.push(Arc::clone(p)).unwrap();
    }
    for p in &people {
        let key = pk.project(p.as_dyn()).unwrap();
        assert!(agg.index("pk").unwrap().get(&key).iter().any(|e| Arc::ptr_eq(e, p)));
    }

    let gone = Arc::clone(&people[4]);
    assert!(agg.remove(&gone).unwrap());
    assert!(!agg.remove(&gone).unwrap());
    let key = pk.project(gone.as_dyn()).unwrap();
    assert!(agg.index("pk").unwrap().get(&key).is_empty());
    assert_eq!(agg.len(), 9);
}

#[test]
fn replace_moves_element_between_buckets() {
    let mut agg = EditableAggregate::new(scheme());
    let by_city = agg.key("by_city").unwrap();
    agg.push(person(1, "Oslo")).unwrap();
    agg.get_index(&by_city, true).unwrap();

    let old = agg.replace(0, person(1, "Rome")).unwrap();
    assert_eq!(old.get(1).unwrap(), Value::text("Oslo"));
    assert!(agg.get(&by_city, &city("Oslo")).unwrap().is_empty());
    assert_eq!(agg.get(&by_city, &city("Rome")).unwrap().len(), 1);
}

// Bulk loading must leave already-built indices consistent rather than
// requiring a rebuild.
#[test]
fn bulk_extend_keeps_existing_indices_consistent() {
    let mut agg = EditableAggregate::new(scheme());
    let by_city = agg.key("by_city").unwrap();
    let pk = agg.key("pk").unwrap();
    agg.push(person(0, "Oslo")).unwrap();
    agg.get_index(&by_city, true).unwrap();
    agg.get_index(&pk, true).unwrap();

    agg.extend((1..=100).map(|i| person(i, if i % 2 == 0 { "Oslo" } else { "Rome" })))
        .unwrap();

    assert_eq!(agg.len(), 101);
    assert_eq!(agg.index("by_city").unwrap().element_count(), 101);
    assert_eq!(agg.index("pk").unwrap().len(), 101);
    assert_eq!(agg.get(&by_city, &city("Oslo")).unwrap().len(), 51);
    assert_eq!(agg.get(&by_city, &city("Rome")).unwrap().len(), 50);

    let rebuilt = Index::build(Arc::clone(&by_city), agg.elements()).unwrap();
    for key in rebuilt.keys() {
        assert_eq!(rebuilt.get(key).len(), agg.index("by_city").unwrap().get(key).len());
    }
}

#[test]
fn failing_projection_leaves_aggregate_unchanged() {
    let mut agg = EditableAggregate::new(scheme());
    let picky: Arc<dyn Projection> = Arc::new(FnProjection::new("picky", false, |t: &dyn Tuple| {
        let id = t.get(0)?;
        if id == Value::Int(13) {
            Err(Error::read_only("unlucky"))
        } else {
            Ok(KeyTuple::single(id))
        }
    }));
    agg.get_index(&picky, true).unwrap();

    let result = agg.extend(vec![person(1, "A"), person(13, "B"), person(2, "C")]);
    assert!(result.is_err());
    assert!(agg.is_empty());
    assert!(agg.index("picky").unwrap().is_empty());
}

#[test]
fn editable_round_trips_through_views() {
    let agg = Aggregate::new(scheme(), vec![person(1, "Oslo")]).unwrap();
    let by_city = agg.key("by_city").unwrap();
    agg.get_index(&by_city, true).unwrap();

    let mut editable = agg.to_editable();
    editable.push(person(2, "Oslo")).unwrap();
    assert_eq!(editable.index("by_city").unwrap().get(&city("Oslo")).len(), 2);

    let view = editable.snapshot();
    assert_eq!(view.len(), 2);
    assert_eq!(agg.len(), 1);
}

#[test]
fn aggregates_hold_concrete_tuple_types() {
    let mut journal: EditableAggregate<JournalTuple> = EditableAggregate::new(scheme());
    let v0 = JournalTuple::new(ValueTuple::from_pairs(scheme(), &[("id", 5.into())]).unwrap());
    journal.push(Arc::clone(&v0)).unwrap();
    let pk = journal.key("pk").unwrap();
    let found = journal.get_one(&pk, &KeyTuple::single(5)).unwrap().unwrap();
    assert!(Arc::ptr_eq(&found, &v0));
}

#[test]
fn index_names_cannot_be_shared_by_different_projections() {
    let agg = Aggregate::new(scheme(), vec![person(1, "Oslo"), person(2, "Rome")]).unwrap();
    let pk = agg.key("pk").unwrap();
    agg.get_index(&pk, true).unwrap();
    assert!(agg.get_index(&agg.key("pk").unwrap(), false).unwrap().is_some());

    let impostor: Arc<dyn Projection> =
        Arc::new(FnProjection::new("pk", true, |t: &dyn Tuple| Ok(KeyTuple::single(t.get(1)?))));
    assert!(matches!(agg.get_index(&impostor, true), Err(Error::Definition(_))));
    assert!(agg.get_one(&impostor, &KeyTuple::single("Oslo")).is_err());

    let mut editable = agg.to_editable();
    assert!(matches!(editable.get_index(&impostor, true), Err(Error::Definition(_))));
    assert_eq!(editable.get_one(&pk, &KeyTuple::single(2)).unwrap().unwrap().get(1).unwrap(), Value::text("Rome"));
}
