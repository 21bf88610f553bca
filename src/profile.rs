// Publishing profiles. A profile decides which columns a row must have,
// which resource it becomes, what JSON creates it and which extra text
// fields get attached afterwards.

use crate::api::ResourceKind;
use crate::error::{Error, Result};
use crate::records::CardRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use url::form_urlencoded;

static SCOPED_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|/)(collections|wishlists)/([0-9a-fA-F-]{36})(?:[/?#]|$)").expect("valid regex")
});
static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F-]{36}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// Items in a collection, with set number, description and rarity fields.
    Item,
    /// Wishes carrying URL and price from a shop listing.
    Wish,
    /// Wishes built from a card list (id, rarity, description).
    CardWish,
}

impl ProfileKind {
    pub fn scope(self) -> Scope {
        match self {
            ProfileKind::Item => Scope::Collection,
            ProfileKind::Wish | ProfileKind::CardWish => Scope::Wishlist,
        }
    }
}

/// The container a new resource is created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Collection,
    Wishlist,
}

impl Scope {
    fn segment(self) -> &'static str {
        match self {
            Scope::Collection => "collections",
            Scope::Wishlist => "wishlists",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub scope: Scope,
    pub id: String,
}

impl CollectionRef {
    /// Accepts a web URL or IRI containing `/collections/<uuid>` or
    /// `/wishlists/<uuid>`, or a bare UUID in `default_scope`.
    pub fn parse(input: &str, default_scope: Scope) -> Result<Self> {
        let input = input.trim();
        if let Some(caps) = SCOPED_ID.captures(input) {
            let scope = if &caps[1] == "collections" {
                Scope::Collection
            } else {
                Scope::Wishlist
            };
            return Ok(CollectionRef {
                scope,
                id: caps[2].to_ascii_lowercase(),
            });
        }
        if BARE_ID.is_match(input) {
            return Ok(CollectionRef {
                scope: default_scope,
                id: input.to_ascii_lowercase(),
            });
        }
        Err(Error::Configuration(format!(
            "cannot find a collection or wishlist id in {input:?}"
        )))
    }

    pub fn iri(&self) -> String {
        format!("/api/{}/{}", self.scope.segment(), self.id)
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iri())
    }
}

/// Which CSV header holds each piece of card data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub name: String,
    pub image: String,
    pub url: Option<String>,
    pub price: Option<String>,
    pub identifier: String,
    pub rarity: String,
    pub description: String,
}

impl Columns {
    /// Header names of the card-list scrapes (`id,name,description,rarity,image_url`).
    pub fn card_list() -> Self {
        Columns {
            name: "name".into(),
            image: "image_url".into(),
            url: None,
            price: None,
            identifier: "id".into(),
            rarity: "rarity".into(),
            description: "description".into(),
        }
    }

    /// Header names of the shop scrapes (`URL,Image URL,Name,Number,Set,Price`).
    pub fn shop_listing() -> Self {
        Columns {
            name: "Name".into(),
            image: "Image URL".into(),
            url: Some("URL".into()),
            price: Some("Price".into()),
            identifier: "Number".into(),
            rarity: "Rarity".into(),
            description: "Set".into(),
        }
    }

    fn optional<'r>(record: &'r CardRecord, column: &Option<String>) -> &'r str {
        column.as_deref().map_or("", |c| record.get_or_empty(c))
    }

    pub fn url_of<'r>(&self, record: &'r CardRecord) -> &'r str {
        Self::optional(record, &self.url)
    }

    pub fn price_of<'r>(&self, record: &'r CardRecord) -> &'r str {
        Self::optional(record, &self.price)
    }
}

/// Builds the JSON body of the create call.
pub trait CreatePayloadBuilder {
    fn resource(&self) -> ResourceKind;
    fn build(&self, record: &CardRecord) -> Value;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxField {
    pub label: String,
    pub value: String,
}

/// Text fields attached to a resource after it was created.
pub trait AuxiliaryFieldSet {
    fn fields(&self, record: &CardRecord) -> Vec<AuxField>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMapping {
    pub label: String,
    pub column: String,
}

impl FieldMapping {
    pub fn new(label: &str, column: &str) -> Self {
        FieldMapping {
            label: label.into(),
            column: column.into(),
        }
    }
}

/// Posts one field per mapping whose column has a value.
pub struct LabelledColumns(pub Vec<FieldMapping>);

impl AuxiliaryFieldSet for LabelledColumns {
    fn fields(&self, record: &CardRecord) -> Vec<AuxField> {
        self.0
            .iter()
            .filter_map(|m| {
                record.non_empty(&m.column).map(|value| AuxField {
                    label: m.label.clone(),
                    value: value.to_string(),
                })
            })
            .collect()
    }
}

pub struct ItemPayload {
    columns: Columns,
    collection: String,
    visibility: String,
}

impl CreatePayloadBuilder for ItemPayload {
    fn resource(&self) -> ResourceKind {
        ResourceKind::Item
    }

    fn build(&self, record: &CardRecord) -> Value {
        json!({
            "name": record.get_or_empty(&self.columns.name),
            "collection": self.collection,
            "visibility": self.visibility,
        })
    }
}

pub struct WishPayload {
    columns: Columns,
    wishlist: String,
    visibility: String,
    currency: String,
}

impl CreatePayloadBuilder for WishPayload {
    fn resource(&self) -> ResourceKind {
        ResourceKind::Wish
    }

    fn build(&self, record: &CardRecord) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), json!(record.get_or_empty(&self.columns.name)));
        let url = self.columns.url_of(record);
        if !url.is_empty() {
            body.insert("url".into(), json!(url));
            body.insert("comment".into(), json!(url));
        }
        body.insert("wishlist".into(), json!(self.wishlist));
        let price = self.columns.price_of(record);
        if !price.is_empty() {
            body.insert("price".into(), json!(price));
            body.insert("currency".into(), json!(self.currency));
        }
        body.insert("visibility".into(), json!(self.visibility));
        Value::Object(body)
    }
}

pub struct CardWishPayload {
    columns: Columns,
    wishlist: String,
    visibility: String,
    search_url_template: Option<String>,
}

impl CardWishPayload {
    fn search_url(&self, record: &CardRecord) -> Option<String> {
        let template = self.search_url_template.as_deref()?;
        let encode = |s: &str| form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
        Some(
            template
                .replace("{name}", &encode(record.get_or_empty(&self.columns.name)))
                .replace("{id}", &encode(record.get_or_empty(&self.columns.identifier))),
        )
    }
}

impl CreatePayloadBuilder for CardWishPayload {
    fn resource(&self) -> ResourceKind {
        ResourceKind::Wish
    }

    fn build(&self, record: &CardRecord) -> Value {
        let c = &self.columns;
        let comment = format!(
            "{} ({}) - {}",
            record.get_or_empty(&c.identifier),
            record.get_or_empty(&c.rarity),
            record.get_or_empty(&c.description)
        );
        let mut body = Map::new();
        body.insert("name".into(), json!(record.get_or_empty(&c.name)));
        if let Some(url) = self.search_url(record) {
            body.insert("url".into(), json!(url));
        }
        body.insert("comment".into(), json!(comment));
        body.insert("wishlist".into(), json!(self.wishlist));
        body.insert("visibility".into(), json!(self.visibility));
        Value::Object(body)
    }
}

/// Everything the publisher needs to know about one kind of run.
pub struct Profile {
    pub kind: ProfileKind,
    pub columns: Columns,
    pub visibility: String,
    payload: Box<dyn CreatePayloadBuilder>,
    fields: Box<dyn AuxiliaryFieldSet>,
}

/// Knobs shared by every profile constructor.
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub visibility: String,
    pub currency: String,
    pub search_url_template: Option<String>,
    pub columns: Option<Columns>,
    pub fields: Option<Vec<FieldMapping>>,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        ProfileOptions {
            visibility: "public".into(),
            currency: "EUR".into(),
            search_url_template: None,
            columns: None,
            fields: None,
        }
    }
}

impl Profile {
    pub fn new(kind: ProfileKind, target: &CollectionRef, options: ProfileOptions) -> Result<Self> {
        if target.scope != kind.scope() {
            return Err(Error::Configuration(format!(
                "{kind:?} profile publishes into {}, but the target is {}",
                kind.scope().segment(),
                target.iri()
            )));
        }

        let columns = options.columns.unwrap_or_else(|| match kind {
            ProfileKind::Wish => Columns::shop_listing(),
            ProfileKind::Item | ProfileKind::CardWish => Columns::card_list(),
        });
        let default_fields = match kind {
            ProfileKind::Item => vec![
                FieldMapping::new("Set Number", &columns.identifier),
                FieldMapping::new("Description", &columns.description),
                FieldMapping::new("Rarity", &columns.rarity),
            ],
            ProfileKind::Wish | ProfileKind::CardWish => Vec::new(),
        };
        let fields = LabelledColumns(options.fields.unwrap_or(default_fields));

        let payload: Box<dyn CreatePayloadBuilder> = match kind {
            ProfileKind::Item => Box::new(ItemPayload {
                columns: columns.clone(),
                collection: target.iri(),
                visibility: options.visibility.clone(),
            }),
            ProfileKind::Wish => Box::new(WishPayload {
                columns: columns.clone(),
                wishlist: target.iri(),
                visibility: options.visibility.clone(),
                currency: options.currency.clone(),
            }),
            ProfileKind::CardWish => Box::new(CardWishPayload {
                columns: columns.clone(),
                wishlist: target.iri(),
                visibility: options.visibility.clone(),
                search_url_template: options.search_url_template.clone(),
            }),
        };

        Ok(Profile {
            kind,
            columns,
            visibility: options.visibility,
            payload,
            fields: Box::new(fields),
        })
    }

    pub fn resource(&self) -> ResourceKind {
        self.payload.resource()
    }

    /// Card name and image URL, or a validation error naming the missing column.
    pub fn validate<'r>(&self, record: &'r CardRecord) -> Result<(&'r str, &'r str)> {
        let name = record
            .non_empty(&self.columns.name)
            .ok_or_else(|| Error::Validation(format!("missing {:?}", self.columns.name)))?;
        let image = record
            .non_empty(&self.columns.image)
            .ok_or_else(|| Error::Validation(format!("missing {:?}", self.columns.image)))?;
        Ok((name, image))
    }

    pub fn payload(&self, record: &CardRecord) -> Value {
        self.payload.build(record)
    }

    pub fn fields(&self, record: &CardRecord) -> Vec<AuxField> {
        self.fields.fields(record)
    }
}
