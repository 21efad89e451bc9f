//! Document projection
//!
//! Turns an expanded entity graph into the flat document pushed to the
//! search index. Projection is pure: no I/O, and the same input always
//! serializes to the same bytes (documents are backed by a sorted map).
//!
//! Related entities are flattened into named sub-objects carrying only
//! the fields worth displaying or searching. A missing relation projects
//! to zero values (`0`, `""`, `false`) instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::{Inventory, Miscellaneous, Purchase, RecordId, Relationship, Sale};

/// Name of the field every document is keyed by
pub const PRIMARY_KEY: &str = "id";

/// A flat, search-engine-friendly document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchDocument(Map<String, Value>);

impl SearchDocument {
    /// Wrap a JSON value; only objects are documents
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Numeric primary key, if the document carries one
    pub fn id(&self) -> Option<RecordId> {
        self.0.get(PRIMARY_KEY).and_then(Value::as_i64)
    }

    /// Primary key as the string the index addresses documents by
    ///
    /// Integers and non-empty strings are accepted.
    pub fn key(&self, primary_key: &str) -> Option<String> {
        match self.0.get(primary_key)? {
            Value::Number(n) => n.as_i64().map(|id| id.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Look up a dotted path such as `relationships.name`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow merge: top-level fields of `other` replace ours
    pub fn merge(&mut self, other: SearchDocument) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }
}

// ==================== Expanded records ====================

/// A purchase with its supplier resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedPurchase {
    pub purchase: Purchase,
    pub relationship: Option<Relationship>,
}

/// An inventory item with its purchase (and that purchase's supplier)
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedInventory {
    pub inventory: Inventory,
    pub purchase: Option<ExpandedPurchase>,
}

/// A sale with every reference resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedSale {
    pub sale: Sale,
    pub relationship: Option<Relationship>,
    pub purchase: Option<ExpandedPurchase>,
    pub inventory: Option<ExpandedInventory>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedMiscellaneous {
    pub miscellaneous: Miscellaneous,
    pub purchase: Option<ExpandedPurchase>,
}

// ==================== Projections ====================

pub fn project_relationship(relationship: &Relationship) -> SearchDocument {
    document(json!({
        "id": relationship.id.unwrap_or_default(),
        "name": relationship.name,
        "phone_number": relationship.phone_number,
        "address": relationship.address,
    }))
}

pub fn project_purchase(expanded: &ExpandedPurchase) -> SearchDocument {
    let purchase = &expanded.purchase;
    document(json!({
        "id": purchase.id.unwrap_or_default(),
        "company_name": purchase.company_name,
        "vehicle_name": purchase.vehicle_name,
        "vehicle_number": purchase.vehicle_number,
        "date": purchase.date.format("%Y-%m-%d").to_string(),
        "price": purchase.price,
        "relationships": relationship_summary(expanded.relationship.as_ref()),
    }))
}

pub fn project_inventory(expanded: &ExpandedInventory) -> SearchDocument {
    let inventory = &expanded.inventory;
    let supplier = expanded
        .purchase
        .as_ref()
        .and_then(|p| p.relationship.as_ref());
    document(json!({
        "id": inventory.id.unwrap_or_default(),
        "part_name": inventory.part_name,
        "quantity": inventory.quantity,
        "purchases": purchase_summary(expanded.purchase.as_ref().map(|p| &p.purchase)),
        "relationships": relationship_summary(supplier),
    }))
}

pub fn project_sale(expanded: &ExpandedSale) -> SearchDocument {
    let sale = &expanded.sale;
    document(json!({
        "id": sale.id.unwrap_or_default(),
        "price": sale.price,
        "date": sale.date.format("%Y-%m-%d").to_string(),
        "credit": sale.credit,
        "returned": sale.returned,
        "relationships": relationship_summary(expanded.relationship.as_ref()),
        "purchases": purchase_summary(expanded.purchase.as_ref().map(|p| &p.purchase)),
        "inventory": inventory_summary(expanded.inventory.as_ref().map(|i| &i.inventory)),
    }))
}

pub fn project_miscellaneous(expanded: &ExpandedMiscellaneous) -> SearchDocument {
    let misc = &expanded.miscellaneous;
    document(json!({
        "id": misc.id.unwrap_or_default(),
        "description": misc.description,
        "price": misc.price,
        "date": misc.date.format("%Y-%m-%d").to_string(),
        "purchases": purchase_summary(expanded.purchase.as_ref().map(|p| &p.purchase)),
    }))
}

fn relationship_summary(relationship: Option<&Relationship>) -> Value {
    match relationship {
        Some(r) => json!({ "id": r.id.unwrap_or_default(), "name": r.name }),
        None => json!({ "id": 0, "name": "" }),
    }
}

fn purchase_summary(purchase: Option<&Purchase>) -> Value {
    match purchase {
        Some(p) => json!({
            "id": p.id.unwrap_or_default(),
            "company_name": p.company_name,
            "vehicle_name": p.vehicle_name,
            "price": p.price,
        }),
        None => json!({ "id": 0, "company_name": "", "vehicle_name": "", "price": 0.0 }),
    }
}

fn inventory_summary(inventory: Option<&Inventory>) -> Value {
    match inventory {
        Some(i) => json!({
            "id": i.id.unwrap_or_default(),
            "part_name": i.part_name,
            "quantity": i.quantity,
        }),
        None => json!({ "id": 0, "part_name": "", "quantity": 0 }),
    }
}

// Every projection above builds an object literal.
fn document(value: Value) -> SearchDocument {
    SearchDocument::from_value(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn supplier() -> Relationship {
        Relationship {
            id: Some(2),
            name: "Acme Salvage".to_string(),
            phone_number: "555-0100".to_string(),
            address: "1 Yard Rd".to_string(),
        }
    }

    fn purchase() -> ExpandedPurchase {
        let mut purchase = Purchase::new("Acme", "Corolla", date("2023-12-01"));
        purchase.id = Some(5);
        purchase.relationship_id = Some(2);
        purchase.price = 1500.0;
        ExpandedPurchase {
            purchase,
            relationship: Some(supplier()),
        }
    }

    fn sale() -> ExpandedSale {
        let mut sale = Sale::new(100.0, date("2024-01-01"));
        sale.id = Some(9);
        sale.relationship_id = Some(2);
        sale.purchase_id = Some(5);
        ExpandedSale {
            sale,
            relationship: Some(supplier()),
            purchase: Some(purchase()),
            inventory: None,
        }
    }

    #[test]
    fn test_project_sale_fields() {
        let doc = project_sale(&sale());

        assert_eq!(doc.id(), Some(9));
        assert_eq!(doc.get("price"), Some(&json!(100.0)));
        assert_eq!(doc.get("date"), Some(&json!("2024-01-01")));
        assert_eq!(doc.get("credit"), Some(&json!(false)));
        assert_eq!(doc.get_path("relationships.id"), Some(&json!(2)));
        assert_eq!(doc.get_path("relationships.name"), Some(&json!("Acme Salvage")));
        assert_eq!(doc.get_path("purchases.id"), Some(&json!(5)));
        assert_eq!(doc.get_path("purchases.vehicle_name"), Some(&json!("Corolla")));
    }

    #[test]
    fn test_project_carries_only_summary_fields() {
        let doc = project_sale(&sale());

        // Nested graph is not carried through
        assert!(doc.get_path("relationships.phone_number").is_none());
        assert!(doc.get_path("purchases.relationships").is_none());
        assert!(doc.get_path("purchases.date").is_none());
    }

    #[test]
    fn test_missing_relation_projects_zero_values() {
        let doc = project_sale(&sale());

        assert_eq!(doc.get_path("inventory.id"), Some(&json!(0)));
        assert_eq!(doc.get_path("inventory.part_name"), Some(&json!("")));
        assert_eq!(doc.get_path("inventory.quantity"), Some(&json!(0)));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let first = serde_json::to_vec(&project_sale(&sale())).unwrap();
        let second = serde_json::to_vec(&project_sale(&sale())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_project_inventory_uses_purchase_supplier() {
        let mut inventory = Inventory::new("Alternator", 3);
        inventory.id = Some(11);
        inventory.purchase_id = Some(5);
        let doc = project_inventory(&ExpandedInventory {
            inventory,
            purchase: Some(purchase()),
        });

        assert_eq!(doc.get_path("purchases.company_name"), Some(&json!("Acme")));
        assert_eq!(doc.get_path("relationships.name"), Some(&json!("Acme Salvage")));
        assert_eq!(doc.get("quantity"), Some(&json!(3)));
    }

    #[test]
    fn test_project_miscellaneous_without_purchase() {
        let mut misc = Miscellaneous::new("Tow truck", 80.0, date("2024-02-02"));
        misc.id = Some(3);
        let doc = project_miscellaneous(&ExpandedMiscellaneous {
            miscellaneous: misc,
            purchase: None,
        });

        assert_eq!(doc.id(), Some(3));
        assert_eq!(doc.get_path("purchases.id"), Some(&json!(0)));
    }

    #[test]
    fn test_document_key() {
        let numeric = SearchDocument::from_value(json!({"id": 7})).unwrap();
        assert_eq!(numeric.key(PRIMARY_KEY), Some("7".to_string()));

        let text = SearchDocument::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(text.key(PRIMARY_KEY), Some("abc".to_string()));

        let missing = SearchDocument::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(missing.key(PRIMARY_KEY), None);

        let float = SearchDocument::from_value(json!({"id": 1.5})).unwrap();
        assert_eq!(float.key(PRIMARY_KEY), None);

        assert!(SearchDocument::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_merge_replaces_top_level_fields() {
        let mut doc = SearchDocument::from_value(json!({"id": 1, "a": 1, "b": {"x": 1}})).unwrap();
        doc.merge(SearchDocument::from_value(json!({"id": 1, "b": {"y": 2}})).unwrap());

        assert_eq!(doc.get("a"), Some(&json!(1)));
        assert_eq!(doc.get("b"), Some(&json!({"y": 2})));
    }
}
