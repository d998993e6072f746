//! Entity type metadata.
//!
//! The server exposes metadata through two APIs with different shapes:
//!
//! - REST v1 (`v1/{entity}/meta`), modelled by [`EntityMeta`] and
//!   [`AttributeMeta`]. Attributes are keyed by name.
//! - The metadata API (`metadata/{entity}`), modelled by [`EntityType`] and
//!   [`Attribute`]. Attributes are an ordered list, and reference targets can
//!   be expanded in place.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::client::{segment, Session};
use crate::error::{MolgenisError, Result};
use crate::traits::Get;

/// Attribute data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    Bool,
    Categorical,
    CategoricalMref,
    Compound,
    Date,
    DateTime,
    Decimal,
    Email,
    Enum,
    File,
    Html,
    Hyperlink,
    Int,
    Long,
    Mref,
    OneToMany,
    Script,
    String,
    Text,
    Xref,
    /// A type this client does not know about.
    #[default]
    Unknown,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Categorical => "CATEGORICAL",
            Self::CategoricalMref => "CATEGORICAL_MREF",
            Self::Compound => "COMPOUND",
            Self::Date => "DATE",
            Self::DateTime => "DATE_TIME",
            Self::Decimal => "DECIMAL",
            Self::Email => "EMAIL",
            Self::Enum => "ENUM",
            Self::File => "FILE",
            Self::Html => "HTML",
            Self::Hyperlink => "HYPERLINK",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Mref => "MREF",
            Self::OneToMany => "ONE_TO_MANY",
            Self::Script => "SCRIPT",
            Self::String => "STRING",
            Self::Text => "TEXT",
            Self::Xref => "XREF",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// References a single row of another entity type.
    pub fn is_single_reference(&self) -> bool {
        matches!(self, Self::Xref | Self::Categorical | Self::File)
    }

    /// References any number of rows of another entity type.
    pub fn is_multi_reference(&self) -> bool {
        matches!(self, Self::Mref | Self::CategoricalMref | Self::OneToMany)
    }

    pub fn is_reference(&self) -> bool {
        self.is_single_reference() || self.is_multi_reference()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    /// Parses both the v1 (`ONE_TO_MANY`) and metadata API (`one_to_many`) spellings.
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "BOOL" => Self::Bool,
            "CATEGORICAL" => Self::Categorical,
            "CATEGORICAL_MREF" => Self::CategoricalMref,
            "COMPOUND" => Self::Compound,
            "DATE" => Self::Date,
            "DATE_TIME" | "DATETIME" => Self::DateTime,
            "DECIMAL" => Self::Decimal,
            "EMAIL" => Self::Email,
            "ENUM" => Self::Enum,
            "FILE" => Self::File,
            "HTML" => Self::Html,
            "HYPERLINK" => Self::Hyperlink,
            "INT" => Self::Int,
            "LONG" => Self::Long,
            "MREF" => Self::Mref,
            "ONE_TO_MANY" | "ONETOMANY" => Self::OneToMany,
            "SCRIPT" => Self::Script,
            "STRING" => Self::String,
            "TEXT" => Self::Text,
            "XREF" => Self::Xref,
            _ => Self::Unknown,
        })
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

// =============================================================================
// REST v1 metadata
// =============================================================================

/// Metadata of an entity type as returned by `v1/{entity}/meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Fully qualified entity type name.
    pub name: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Name of the identifier attribute.
    #[serde(default)]
    pub id_attribute: Option<String>,

    #[serde(default)]
    pub label_attribute: Option<String>,

    #[serde(default)]
    pub lookup_attributes: Vec<String>,

    #[serde(default)]
    pub is_abstract: bool,

    #[serde(default)]
    pub writable: bool,

    /// Attributes keyed by name.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMeta>,
}

/// Metadata of a single attribute as returned by the v1 API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMeta {
    pub name: String,

    #[serde(default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub nillable: bool,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub visible: bool,

    #[serde(default)]
    pub auto: bool,

    #[serde(default)]
    pub label_attribute: bool,

    #[serde(default)]
    pub lookup_attribute: bool,

    #[serde(default)]
    pub enum_options: Vec<String>,

    #[serde(default)]
    pub max_length: Option<u64>,

    /// Link to the referenced entity type, for reference attributes.
    #[serde(default)]
    pub ref_entity: Option<RefEntityLink>,
}

/// Link to a referenced entity type in v1 metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefEntityLink {
    pub href: String,
    #[serde(default)]
    pub href_collection: Option<String>,
}

impl RefEntityLink {
    /// Entity type id extracted from `…/v1/{entity}/meta`.
    pub fn entity_type_id(&self) -> Option<&str> {
        let path = self.href.trim_end_matches('/');
        let path = path.strip_suffix("/meta").unwrap_or(path);
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl EntityMeta {
    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeMeta> {
        self.attributes.get(name)
    }

    /// Names of all attributes with the given type.
    pub fn attributes_of_type(&self, field_type: FieldType) -> Vec<&str> {
        self.attributes
            .values()
            .filter(|a| a.field_type == field_type)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Names of the one-to-many attributes, which the server rejects on create.
    pub fn one_to_many_attributes(&self) -> Vec<&str> {
        self.attributes_of_type(FieldType::OneToMany)
    }
}

#[async_trait]
impl Get for EntityMeta {
    type Id = String; // Entity type name

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, entity: String) -> Result<Self> {
        session.get_entity_meta_data(&entity).await
    }
}

// =============================================================================
// Metadata API
// =============================================================================

/// An entity type as returned by the metadata API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    pub id: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,

    /// Attributes in declaration order.
    #[serde(default, with = "items")]
    pub attributes: Vec<Attribute>,
}

/// An attribute as returned by the metadata API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Whether this attribute is the entity type's identifier.
    #[serde(default)]
    pub id_attribute: bool,

    #[serde(default)]
    pub label_attribute: bool,

    #[serde(default)]
    pub nullable: bool,

    /// Target of a reference attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_entity_type: Option<RefEntityType>,
}

/// Reference target: a link until expanded, then the full entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefEntityType {
    Expanded(Box<EntityType>),
    Link {
        #[serde(rename = "self")]
        href: String,
    },
}

impl RefEntityType {
    /// Id of the referenced entity type.
    pub fn entity_type_id(&self) -> Option<&str> {
        match self {
            Self::Expanded(entity_type) => Some(entity_type.id.as_str()),
            Self::Link { href } => href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty()),
        }
    }

    /// The expanded entity type, if resolved.
    pub fn expanded(&self) -> Option<&EntityType> {
        match self {
            Self::Expanded(entity_type) => Some(entity_type),
            Self::Link { .. } => None,
        }
    }
}

impl EntityType {
    /// Attribute names in declaration order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// All attributes flagged as identifier.
    pub fn id_attributes(&self) -> Vec<&Attribute> {
        self.attributes.iter().filter(|a| a.id_attribute).collect()
    }
}

/// The `{"items": [{"data": …}]}` envelope around metadata API attribute lists.
mod items {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Attribute;

    #[derive(Serialize, Deserialize)]
    struct Item<T> {
        data: T,
    }

    #[derive(Serialize, Deserialize)]
    struct Items<T> {
        #[serde(default = "Vec::new")]
        items: Vec<Item<T>>,
    }

    pub fn serialize<S: Serializer>(attributes: &[Attribute], serializer: S) -> Result<S::Ok, S::Error> {
        Items {
            items: attributes.iter().map(|data| Item { data }).collect(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Attribute>, D::Error> {
        let items = Items::<Attribute>::deserialize(deserializer)?;
        Ok(items.items.into_iter().map(|item| item.data).collect())
    }
}

#[derive(Deserialize)]
struct MetadataResponse {
    data: EntityType,
}

impl Session {
    /// Retrieve the v1 metadata of an entity type, attributes included.
    #[tracing::instrument(skip(self))]
    pub async fn get_entity_meta_data(&self, entity: &str) -> Result<EntityMeta> {
        let path = format!("v1/{}/meta?expand=attributes", segment(entity));
        let response = self.send(self.request(Method::GET, &path)?).await?;
        response.json().await.map_err(MolgenisError::HttpError)
    }

    /// Retrieve the v1 metadata of a single attribute.
    #[tracing::instrument(skip(self))]
    pub async fn get_attribute_meta_data(
        &self,
        entity: &str,
        attribute: &str,
    ) -> Result<AttributeMeta> {
        let path = format!("v1/{}/meta/{}", segment(entity), segment(attribute));
        let response = self.send(self.request(Method::GET, &path)?).await?;
        response.json().await.map_err(MolgenisError::HttpError)
    }

    /// Retrieve an entity type from the metadata API.
    ///
    /// With `expand`, the target of every reference attribute is fetched
    /// (flattened, one level deep) and stored in place of its link. With
    /// `flatten`, attributes inherited from abstract parents are included.
    #[tracing::instrument(skip(self))]
    pub async fn get_meta(
        &self,
        entity_type_id: &str,
        expand: bool,
        flatten: bool,
    ) -> Result<EntityType> {
        let mut meta = self.fetch_entity_type(entity_type_id, flatten).await?;

        if expand {
            for attribute in &mut meta.attributes {
                let Some(ref_id) = attribute
                    .ref_entity_type
                    .as_ref()
                    .and_then(RefEntityType::entity_type_id)
                    .map(str::to_string)
                else {
                    continue;
                };
                tracing::debug!(attribute = %attribute.name, %ref_id, "expanding reference");
                let ref_meta = self.fetch_entity_type(&ref_id, true).await?;
                attribute.ref_entity_type = Some(RefEntityType::Expanded(Box::new(ref_meta)));
            }
        }

        Ok(meta)
    }

    async fn fetch_entity_type(&self, entity_type_id: &str, flatten: bool) -> Result<EntityType> {
        let path = format!(
            "metadata/{}?flattenAttributes={flatten}",
            segment(entity_type_id)
        );
        let response = self.send(self.request(Method::GET, &path)?).await?;
        let body: MetadataResponse = response.json().await.map_err(MolgenisError::HttpError)?;
        Ok(body.data)
    }
}
