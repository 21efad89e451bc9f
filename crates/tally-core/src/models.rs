//! Data models for Tally
//!
//! Canonical rows for every business entity, plus the typed patches used
//! for partial updates. A patch field that is `None` was not sent by the
//! caller and leaves the stored value alone; `Some(false)` / `Some(None)`
//! are real values and always get written.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Primary key shared by the relational row and its search document
pub type RecordId = i64;

/// A counterparty (customer or supplier)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Relationship {
    /// Assigned by the database when absent
    #[serde(default)]
    pub id: Option<RecordId>,
    pub name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub address: String,
}

impl Relationship {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A vehicle bought for parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub relationship_id: Option<RecordId>,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub vehicle_name: String,
    #[serde(default)]
    pub vehicle_number: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub price: f64,
}

impl Purchase {
    pub fn new(company_name: impl Into<String>, vehicle_name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: None,
            relationship_id: None,
            company_name: company_name.into(),
            vehicle_name: vehicle_name.into(),
            vehicle_number: String::new(),
            date,
            price: 0.0,
        }
    }
}

/// A part salvaged from a purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Inventory {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub purchase_id: Option<RecordId>,
    pub part_name: String,
    #[serde(default)]
    pub quantity: i64,
}

impl Inventory {
    pub fn new(part_name: impl Into<String>, quantity: i64) -> Self {
        Self {
            part_name: part_name.into(),
            quantity,
            ..Default::default()
        }
    }
}

/// A sale of a part or vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub relationship_id: Option<RecordId>,
    #[serde(default)]
    pub purchase_id: Option<RecordId>,
    #[serde(default)]
    pub inventory_id: Option<RecordId>,
    #[serde(default)]
    pub price: f64,
    pub date: NaiveDate,
    /// Paid on credit
    #[serde(default)]
    pub credit: bool,
    #[serde(default)]
    pub returned: bool,
}

impl Sale {
    pub fn new(price: f64, date: NaiveDate) -> Self {
        Self {
            id: None,
            relationship_id: None,
            purchase_id: None,
            inventory_id: None,
            price,
            date,
            credit: false,
            returned: false,
        }
    }
}

/// Any other expense, optionally tied to a purchase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Miscellaneous {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub purchase_id: Option<RecordId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    pub date: NaiveDate,
}

impl Miscellaneous {
    pub fn new(description: impl Into<String>, price: f64, date: NaiveDate) -> Self {
        Self {
            id: None,
            purchase_id: None,
            description: description.into(),
            price,
            date,
        }
    }
}

/// An application user. Only ever stored relationally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub name: String,
    pub email: String,
    /// Opaque hash produced by the auth layer; never echoed back
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

// ==================== Patches ====================

/// A partial update addressed by primary key
pub trait RecordPatch<E>: serde::de::DeserializeOwned {
    /// Row this patch targets
    fn id(&self) -> RecordId;

    /// Overwrite every field the patch carries
    fn apply_to(self, record: &mut E);
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`)
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RelationshipPatch {
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl RecordPatch<Relationship> for RelationshipPatch {
    fn id(&self) -> RecordId {
        self.id
    }

    fn apply_to(self, record: &mut Relationship) {
        assign(&mut record.name, self.name);
        assign(&mut record.phone_number, self.phone_number);
        assign(&mut record.address, self.address);
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PurchasePatch {
    pub id: RecordId,
    #[serde(default, deserialize_with = "double_option")]
    pub relationship_id: Option<Option<RecordId>>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub vehicle_name: Option<String>,
    #[serde(default)]
    pub vehicle_number: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl RecordPatch<Purchase> for PurchasePatch {
    fn id(&self) -> RecordId {
        self.id
    }

    fn apply_to(self, record: &mut Purchase) {
        assign(&mut record.relationship_id, self.relationship_id);
        assign(&mut record.company_name, self.company_name);
        assign(&mut record.vehicle_name, self.vehicle_name);
        assign(&mut record.vehicle_number, self.vehicle_number);
        assign(&mut record.date, self.date);
        assign(&mut record.price, self.price);
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct InventoryPatch {
    pub id: RecordId,
    #[serde(default, deserialize_with = "double_option")]
    pub purchase_id: Option<Option<RecordId>>,
    #[serde(default)]
    pub part_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl RecordPatch<Inventory> for InventoryPatch {
    fn id(&self) -> RecordId {
        self.id
    }

    fn apply_to(self, record: &mut Inventory) {
        assign(&mut record.purchase_id, self.purchase_id);
        assign(&mut record.part_name, self.part_name);
        assign(&mut record.quantity, self.quantity);
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SalePatch {
    pub id: RecordId,
    #[serde(default, deserialize_with = "double_option")]
    pub relationship_id: Option<Option<RecordId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub purchase_id: Option<Option<RecordId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub inventory_id: Option<Option<RecordId>>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub credit: Option<bool>,
    #[serde(default)]
    pub returned: Option<bool>,
}

impl RecordPatch<Sale> for SalePatch {
    fn id(&self) -> RecordId {
        self.id
    }

    fn apply_to(self, record: &mut Sale) {
        assign(&mut record.relationship_id, self.relationship_id);
        assign(&mut record.purchase_id, self.purchase_id);
        assign(&mut record.inventory_id, self.inventory_id);
        assign(&mut record.price, self.price);
        assign(&mut record.date, self.date);
        assign(&mut record.credit, self.credit);
        assign(&mut record.returned, self.returned);
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MiscellaneousPatch {
    pub id: RecordId,
    #[serde(default, deserialize_with = "double_option")]
    pub purchase_id: Option<Option<RecordId>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl RecordPatch<Miscellaneous> for MiscellaneousPatch {
    fn id(&self) -> RecordId {
        self.id
    }

    fn apply_to(self, record: &mut Miscellaneous) {
        assign(&mut record.purchase_id, self.purchase_id);
        assign(&mut record.description, self.description);
        assign(&mut record.price, self.price);
        assign(&mut record.date, self.date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_sale_deserializes_with_defaults() {
        let sale: Sale = serde_json::from_str(r#"{"price": 100, "date": "2024-01-01"}"#).unwrap();
        assert_eq!(sale.id, None);
        assert_eq!(sale.price, 100.0);
        assert_eq!(sale.date, date("2024-01-01"));
        assert!(!sale.credit);
        assert!(!sale.returned);
        assert!(sale.purchase_id.is_none());
    }

    #[test]
    fn test_sale_requires_date() {
        let result: Result<Sale, _> = serde_json::from_str(r#"{"price": 100}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_patch_distinguishes_missing_from_false() {
        let omitted: SalePatch = serde_json::from_str(r#"{"id": 1, "price": 5}"#).unwrap();
        assert_eq!(omitted.credit, None);

        let explicit: SalePatch = serde_json::from_str(r#"{"id": 1, "credit": false}"#).unwrap();
        assert_eq!(explicit.credit, Some(false));
    }

    #[test]
    fn test_patch_distinguishes_missing_from_null_reference() {
        let omitted: SalePatch = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert_eq!(omitted.purchase_id, None);

        let cleared: SalePatch = serde_json::from_str(r#"{"id": 1, "purchase_id": null}"#).unwrap();
        assert_eq!(cleared.purchase_id, Some(None));

        let set: SalePatch = serde_json::from_str(r#"{"id": 1, "purchase_id": 5}"#).unwrap();
        assert_eq!(set.purchase_id, Some(Some(5)));
    }

    #[test]
    fn test_sale_patch_apply() {
        let mut sale = Sale::new(100.0, date("2024-01-01"));
        sale.id = Some(1);
        sale.credit = true;
        sale.purchase_id = Some(5);

        let patch = SalePatch {
            id: 1,
            credit: Some(false),
            purchase_id: Some(None),
            ..Default::default()
        };
        patch.apply_to(&mut sale);

        assert!(!sale.credit);
        assert_eq!(sale.purchase_id, None);
        // Untouched
        assert_eq!(sale.price, 100.0);
        assert!(!sale.returned);
    }

    #[test]
    fn test_patch_without_flag_leaves_it_alone() {
        let mut sale = Sale::new(100.0, date("2024-01-01"));
        sale.returned = true;

        SalePatch {
            id: 1,
            price: Some(250.0),
            ..Default::default()
        }
        .apply_to(&mut sale);

        assert_eq!(sale.price, 250.0);
        assert!(sale.returned);
    }

    #[test]
    fn test_user_hides_password_hash() {
        let user: User = serde_json::from_str(
            r#"{"name": "Ann", "email": "ann@example.com", "password_hash": "abc"}"#,
        )
        .unwrap();
        assert_eq!(user.password_hash, "abc");

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("abc"));
    }
}
