//! Test data fixtures for the mock server.
//!
//! Provides factory functions for entity types and rows.

use serde_json::{json, Value};

use crate::{Attribute, EntityType, FieldType, RefEntityType, Row};

/// Collection of fixture factories for test data.
pub struct Fixtures;

/// The default data set.
pub struct DefaultScenario {
    pub tables: Vec<(EntityType, Vec<Row>)>,
}

impl Fixtures {
    /// Convert a JSON object literal into a row.
    pub fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    /// A plain attribute.
    pub fn attribute(name: &str, field_type: FieldType) -> Attribute {
        Attribute {
            id: Some(format!("attr-{name}")),
            name: name.to_string(),
            field_type,
            id_attribute: false,
            label_attribute: false,
            nullable: true,
            ref_entity_type: None,
        }
    }

    /// The identifier attribute.
    pub fn id_attribute(name: &str) -> Attribute {
        Attribute {
            id_attribute: true,
            label_attribute: true,
            nullable: false,
            ..Self::attribute(name, FieldType::String)
        }
    }

    /// A reference attribute linking to another entity type.
    pub fn reference(name: &str, field_type: FieldType, ref_entity: &str) -> Attribute {
        Attribute {
            ref_entity_type: Some(RefEntityType::Link {
                href: format!("/api/metadata/{ref_entity}"),
            }),
            ..Self::attribute(name, field_type)
        }
    }

    /// An entity type with the given attributes.
    pub fn entity_type(id: &str, attributes: Vec<Attribute>) -> EntityType {
        EntityType {
            id: id.to_string(),
            label: Some(id.to_string()),
            description: None,
            is_abstract: false,
            attributes,
        }
    }

    /// `Tag(tag)`.
    pub fn tag_type() -> EntityType {
        Self::entity_type("Tag", vec![Self::id_attribute("tag")])
    }

    /// `Person(username, age, pets -> Pet one-to-many)`.
    pub fn person_type() -> EntityType {
        Self::entity_type(
            "Person",
            vec![
                Self::id_attribute("username"),
                Self::attribute("age", FieldType::Int),
                Self::reference("pets", FieldType::OneToMany, "Pet"),
            ],
        )
    }

    /// `Pet(name, owner -> Person, tags -> Tag*)`.
    pub fn pet_type() -> EntityType {
        Self::entity_type(
            "Pet",
            vec![
                Self::id_attribute("name"),
                Self::reference("owner", FieldType::Xref, "Person"),
                Self::reference("tags", FieldType::Mref, "Tag"),
                Self::attribute("weight", FieldType::Decimal),
            ],
        )
    }

    /// Five people, inserted out of identifier order.
    pub fn people() -> Vec<Row> {
        [("eve", 51), ("bob", 34), ("ann", 29), ("dan", 45), ("cat", 38)]
            .into_iter()
            .map(|(username, age)| Self::row(json!({"username": username, "age": age})))
            .collect()
    }

    pub fn tags() -> Vec<Row> {
        ["dog", "brown", "cat"]
            .into_iter()
            .map(|tag| Self::row(json!({"tag": tag})))
            .collect()
    }

    pub fn pets() -> Vec<Row> {
        vec![
            Self::row(json!({"name": "rex", "owner": "ann", "tags": ["dog", "brown"], "weight": 31.5})),
            Self::row(json!({"name": "tom", "owner": "bob", "tags": ["cat"], "weight": 4.2})),
        ]
    }

    /// Tags, people and pets.
    pub fn default_scenario() -> DefaultScenario {
        DefaultScenario {
            tables: vec![
                (Self::tag_type(), Self::tags()),
                (Self::person_type(), Self::people()),
                (Self::pet_type(), Self::pets()),
            ],
        }
    }
}
