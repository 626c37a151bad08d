//! Many-to-one sync: Wheel -> car

mod common;

use common::{attrs, id_value, Fixture};
use elif_relsync::{EntityRef, Record, RelationPayload, Repository, StageOptions, SyncError};
use serde_json::{json, Value};

#[test]
fn test_create_wheel_with_new_car() {
    let fx = Fixture::new();
    let wheel = fx.create("Wheel", json!({ "size": 1, "new_car": { "name": "Car" } }));

    let car = wheel.related_one(&fx.repo, "car").unwrap().unwrap();
    assert_eq!(car.get("name"), Some(&json!("Car")));
    assert_eq!(wheel.record().get("vehicle_id"), Some(&id_value(&car)));
    assert_eq!(fx.repo.count("Vehicle"), 1);
}

#[test]
fn test_attribute_payload_patches_current_car() {
    let fx = Fixture::new();
    let car = fx.insert("Vehicle", json!({ "name": "Car" }));
    let wheel = fx.insert("Wheel", json!({ "size": 1, "vehicle_id": id_value(&car) }));

    let mut synced = fx.load(&wheel);
    synced.fill(&fx.repo, attrs(json!({ "car": { "name": "Bike" } }))).unwrap();

    let staged = synced.related_one(&fx.repo, "car").unwrap().unwrap();
    assert_eq!(staged.id(), car.id());
    assert_eq!(staged.get("name"), Some(&json!("Bike")));
    assert_eq!(fx.repo.find_or_fail("Vehicle", car.id().unwrap()).unwrap().get("name"), Some(&json!("Car")));

    synced.save(&fx.repo).unwrap();

    let saved = fx.repo.find_or_fail("Vehicle", car.id().unwrap()).unwrap();
    assert_eq!(saved.get("name"), Some(&json!("Bike")));
    assert_eq!(fx.repo.count("Vehicle"), 1);
    assert_eq!(fx.persisted(&synced, "car")[0].id(), car.id());
}

#[test]
fn test_new_car_replaces_link_only() {
    let fx = Fixture::new();
    let car = fx.insert("Vehicle", json!({ "name": "Car" }));
    let wheel = fx.insert("Wheel", json!({ "size": 1, "vehicle_id": id_value(&car) }));

    let mut synced = fx.load(&wheel);
    synced.fill(&fx.repo, attrs(json!({ "new_car": { "name": "Truck" } }))).unwrap();
    synced.save(&fx.repo).unwrap();

    let linked = fx.persisted(&synced, "car");
    assert_eq!(linked.len(), 1);
    assert_ne!(linked[0].id(), car.id());
    assert_eq!(linked[0].get("name"), Some(&json!("Truck")));
    assert!(fx.exists(&car));
}

#[test]
fn test_identifier_payload_associates_existing() {
    let fx = Fixture::new();
    let car = fx.insert("Vehicle", json!({ "name": "Car" }));
    let mut synced = fx.build("Wheel");

    synced
        .fill(&fx.repo, attrs(json!({ "size": 2, "car": id_value(&car) })))
        .unwrap();
    synced.save(&fx.repo).unwrap();

    assert_eq!(synced.record().foreign_key("vehicle_id"), car.id());
    assert_eq!(fx.repo.count("Vehicle"), 1);
}

#[test]
fn test_missing_identifier_fails() {
    let fx = Fixture::new();
    let mut synced = fx.build("Wheel");

    let result = synced.fill(&fx.repo, attrs(json!({ "size": 2, "car": 999 })));
    assert!(matches!(result, Err(SyncError::NotFound { .. })));
}

#[test]
fn test_delete_companion_dissociates() {
    let fx = Fixture::new();
    let car = fx.insert("Vehicle", json!({ "name": "Car" }));
    let wheel = fx.insert("Wheel", json!({ "size": 1, "vehicle_id": id_value(&car) }));

    let mut synced = fx.load(&wheel);
    synced.fill(&fx.repo, attrs(json!({ "delete_car": true }))).unwrap();
    assert!(synced.related_one(&fx.repo, "car").unwrap().is_none());
    synced.save(&fx.repo).unwrap();

    let reloaded = fx.repo.find_or_fail("Wheel", wheel.id().unwrap()).unwrap();
    assert_eq!(reloaded.get("vehicle_id"), Some(&Value::Null));
    assert!(fx.exists(&car));
}

#[test]
fn test_unsaved_handle_is_saved_on_commit() {
    let fx = Fixture::new();
    let mut car = Record::new("Vehicle");
    car.set("name", "Car");

    let mut synced = fx.build("Wheel");
    synced
        .stage(&fx.repo, "car", RelationPayload::from(EntityRef::Entity(car.clone())), StageOptions::default())
        .unwrap();

    let staged = synced.related_one(&fx.repo, "car").unwrap().unwrap();
    assert!(staged.is_same_instance(&car));
    assert_eq!(fx.repo.count("Vehicle"), 0);

    synced.record_mut().set("size", 3);
    synced.save(&fx.repo).unwrap();

    assert_eq!(fx.repo.count("Vehicle"), 1);
    let linked = fx.persisted(&synced, "car");
    assert_eq!(linked[0].get("name"), Some(&json!("Car")));
}
