//! Entity catalogue
//!
//! Every indexed business entity implements [`Entity`], which carries all
//! per-type knowledge the store, projector and ledger need: table and index
//! name, column layout, expansion, projection and patch type. The ledger is
//! written once against this trait instead of once per entity.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{
    Inventory, InventoryPatch, Miscellaneous, MiscellaneousPatch, Purchase, PurchasePatch,
    RecordId, RecordPatch, Relationship, RelationshipPatch, Sale, SalePatch,
};
use crate::projection::{
    self, ExpandedInventory, ExpandedMiscellaneous, ExpandedPurchase, ExpandedSale,
    SearchDocument, PRIMARY_KEY,
};
use crate::storage::database::load_ref;
use crate::storage::StorageResult;

/// Per-entity index metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name; always the entity's table name
    pub name: &'static str,
    /// Field documents are keyed by during bulk loads
    pub primary_key: &'static str,
    /// Fields a read may sort by
    pub sortable: &'static [&'static str],
}

/// An entity stored relationally and mirrored into a search index
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;
    const TABLE: &'static str;
    /// Non-key columns, in the order `values()` yields them
    const COLUMNS: &'static [&'static str];
    /// Document fields accepted as a sort key
    const SORTABLE: &'static [&'static str];

    type Patch: RecordPatch<Self>;
    type Expanded: Clone + fmt::Debug;

    fn id(&self) -> Option<RecordId>;

    /// Decode a row selected as `id, COLUMNS...`
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Column values, matching `COLUMNS`
    fn values(&self) -> Vec<Value>;

    /// Resolve related rows to the fixed expansion depth
    fn expand(conn: &Connection, record: Self) -> StorageResult<Self::Expanded>;

    fn project(expanded: &Self::Expanded) -> SearchDocument;

    fn descriptor() -> IndexDescriptor {
        IndexDescriptor {
            name: Self::TABLE,
            primary_key: PRIMARY_KEY,
            sortable: Self::SORTABLE,
        }
    }
}

/// The entity types that own a search index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Relationships,
    Purchases,
    Inventory,
    Sales,
    Miscellaneous,
}

impl EntityKind {
    /// Every managed kind, referenced rows first
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Relationships,
        EntityKind::Purchases,
        EntityKind::Inventory,
        EntityKind::Sales,
        EntityKind::Miscellaneous,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Relationships => Relationship::TABLE,
            EntityKind::Purchases => Purchase::TABLE,
            EntityKind::Inventory => Inventory::TABLE,
            EntityKind::Sales => Sale::TABLE,
            EntityKind::Miscellaneous => Miscellaneous::TABLE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Relationships => "relationships",
            EntityKind::Purchases => "purchases",
            EntityKind::Inventory => "inventory",
            EntityKind::Sales => "sales",
            EntityKind::Miscellaneous => "miscellaneous",
        }
    }

    pub fn descriptor(self) -> IndexDescriptor {
        match self {
            EntityKind::Relationships => Relationship::descriptor(),
            EntityKind::Purchases => Purchase::descriptor(),
            EntityKind::Inventory => Inventory::descriptor(),
            EntityKind::Sales => Sale::descriptor(),
            EntityKind::Miscellaneous => Miscellaneous::descriptor(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let normalized = normalized.strip_prefix("eb_").unwrap_or(&normalized);
        match normalized {
            "relationships" | "relationship" => Ok(EntityKind::Relationships),
            "purchases" | "purchase" => Ok(EntityKind::Purchases),
            "inventory" | "inventories" => Ok(EntityKind::Inventory),
            "sales" | "sale" => Ok(EntityKind::Sales),
            "miscellaneous" | "misc" => Ok(EntityKind::Miscellaneous),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

// ==================== Relationship ====================

impl Entity for Relationship {
    const KIND: EntityKind = EntityKind::Relationships;
    const TABLE: &'static str = "eb_relationships";
    const COLUMNS: &'static [&'static str] = &["name", "phone_number", "address"];
    const SORTABLE: &'static [&'static str] = &["id", "name", "phone_number", "address"];

    type Patch = RelationshipPatch;
    type Expanded = Relationship;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone_number: row.get(2)?,
            address: row.get(3)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.name.clone().into(),
            self.phone_number.clone().into(),
            self.address.clone().into(),
        ]
    }

    fn expand(_conn: &Connection, record: Self) -> StorageResult<Self::Expanded> {
        Ok(record)
    }

    fn project(expanded: &Self::Expanded) -> SearchDocument {
        projection::project_relationship(expanded)
    }
}

// ==================== Purchase ====================

impl Entity for Purchase {
    const KIND: EntityKind = EntityKind::Purchases;
    const TABLE: &'static str = "eb_purchases";
    const COLUMNS: &'static [&'static str] = &[
        "relationship_id",
        "company_name",
        "vehicle_name",
        "vehicle_number",
        "date",
        "price",
    ];
    const SORTABLE: &'static [&'static str] = &[
        "id",
        "company_name",
        "vehicle_name",
        "vehicle_number",
        "date",
        "price",
        "relationships.name",
    ];

    type Patch = PurchasePatch;
    type Expanded = ExpandedPurchase;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            relationship_id: row.get(1)?,
            company_name: row.get(2)?,
            vehicle_name: row.get(3)?,
            vehicle_number: row.get(4)?,
            date: row.get(5)?,
            price: row.get(6)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.relationship_id.into(),
            self.company_name.clone().into(),
            self.vehicle_name.clone().into(),
            self.vehicle_number.clone().into(),
            self.date.to_string().into(),
            self.price.into(),
        ]
    }

    fn expand(conn: &Connection, record: Self) -> StorageResult<Self::Expanded> {
        let relationship = load_ref::<Relationship>(conn, record.relationship_id)?;
        Ok(ExpandedPurchase {
            purchase: record,
            relationship,
        })
    }

    fn project(expanded: &Self::Expanded) -> SearchDocument {
        projection::project_purchase(expanded)
    }
}

// ==================== Inventory ====================

impl Entity for Inventory {
    const KIND: EntityKind = EntityKind::Inventory;
    const TABLE: &'static str = "eb_inventory";
    const COLUMNS: &'static [&'static str] = &["purchase_id", "part_name", "quantity"];
    const SORTABLE: &'static [&'static str] = &[
        "id",
        "part_name",
        "quantity",
        "purchases.company_name",
        "purchases.vehicle_name",
    ];

    type Patch = InventoryPatch;
    type Expanded = ExpandedInventory;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            purchase_id: row.get(1)?,
            part_name: row.get(2)?,
            quantity: row.get(3)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.purchase_id.into(),
            self.part_name.clone().into(),
            self.quantity.into(),
        ]
    }

    fn expand(conn: &Connection, record: Self) -> StorageResult<Self::Expanded> {
        let purchase = match load_ref::<Purchase>(conn, record.purchase_id)? {
            Some(purchase) => Some(Purchase::expand(conn, purchase)?),
            None => None,
        };
        Ok(ExpandedInventory {
            inventory: record,
            purchase,
        })
    }

    fn project(expanded: &Self::Expanded) -> SearchDocument {
        projection::project_inventory(expanded)
    }
}

// ==================== Sale ====================

impl Entity for Sale {
    const KIND: EntityKind = EntityKind::Sales;
    const TABLE: &'static str = "eb_sales";
    const COLUMNS: &'static [&'static str] = &[
        "relationship_id",
        "purchase_id",
        "inventory_id",
        "price",
        "date",
        "credit",
        "returned",
    ];
    const SORTABLE: &'static [&'static str] = &[
        "id",
        "price",
        "date",
        "credit",
        "returned",
        "relationships.name",
        "purchases.vehicle_name",
        "inventory.part_name",
    ];

    type Patch = SalePatch;
    type Expanded = ExpandedSale;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            relationship_id: row.get(1)?,
            purchase_id: row.get(2)?,
            inventory_id: row.get(3)?,
            price: row.get(4)?,
            date: row.get(5)?,
            credit: row.get(6)?,
            returned: row.get(7)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.relationship_id.into(),
            self.purchase_id.into(),
            self.inventory_id.into(),
            self.price.into(),
            self.date.to_string().into(),
            self.credit.into(),
            self.returned.into(),
        ]
    }

    fn expand(conn: &Connection, record: Self) -> StorageResult<Self::Expanded> {
        let relationship = load_ref::<Relationship>(conn, record.relationship_id)?;
        let purchase = match load_ref::<Purchase>(conn, record.purchase_id)? {
            Some(purchase) => Some(Purchase::expand(conn, purchase)?),
            None => None,
        };
        let inventory = match load_ref::<Inventory>(conn, record.inventory_id)? {
            Some(inventory) => Some(Inventory::expand(conn, inventory)?),
            None => None,
        };
        Ok(ExpandedSale {
            sale: record,
            relationship,
            purchase,
            inventory,
        })
    }

    fn project(expanded: &Self::Expanded) -> SearchDocument {
        projection::project_sale(expanded)
    }
}

// ==================== Miscellaneous ====================

impl Entity for Miscellaneous {
    const KIND: EntityKind = EntityKind::Miscellaneous;
    const TABLE: &'static str = "eb_miscellaneous";
    const COLUMNS: &'static [&'static str] = &["purchase_id", "description", "price", "date"];
    const SORTABLE: &'static [&'static str] = &["id", "description", "price", "date"];

    type Patch = MiscellaneousPatch;
    type Expanded = ExpandedMiscellaneous;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            purchase_id: row.get(1)?,
            description: row.get(2)?,
            price: row.get(3)?,
            date: row.get(4)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.purchase_id.into(),
            self.description.clone().into(),
            self.price.into(),
            self.date.to_string().into(),
        ]
    }

    fn expand(conn: &Connection, record: Self) -> StorageResult<Self::Expanded> {
        let purchase = match load_ref::<Purchase>(conn, record.purchase_id)? {
            Some(purchase) => Some(Purchase::expand(conn, purchase)?),
            None => None,
        };
        Ok(ExpandedMiscellaneous {
            miscellaneous: record,
            purchase,
        })
    }

    fn project(expanded: &Self::Expanded) -> SearchDocument {
        projection::project_miscellaneous(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("sales".parse::<EntityKind>().unwrap(), EntityKind::Sales);
        assert_eq!("Sale".parse::<EntityKind>().unwrap(), EntityKind::Sales);
        assert_eq!("eb_sales".parse::<EntityKind>().unwrap(), EntityKind::Sales);
        assert_eq!("misc".parse::<EntityKind>().unwrap(), EntityKind::Miscellaneous);
        assert_eq!(
            "relationship".parse::<EntityKind>().unwrap(),
            EntityKind::Relationships
        );
        assert!("users".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_kind_tables_match_entities() {
        assert_eq!(EntityKind::Sales.table(), "eb_sales");
        assert_eq!(EntityKind::Inventory.table(), "eb_inventory");
        for kind in EntityKind::ALL {
            assert!(kind.table().starts_with("eb_"));
            assert_eq!(kind.name().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_descriptor_uses_table_name() {
        let descriptor = Sale::descriptor();
        assert_eq!(descriptor.name, "eb_sales");
        assert_eq!(descriptor.primary_key, "id");
        assert!(descriptor.sortable.contains(&"date"));
    }

    #[test]
    fn test_values_match_columns() {
        use chrono::NaiveDate;
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        assert_eq!(
            Relationship::new("A").values().len(),
            Relationship::COLUMNS.len()
        );
        assert_eq!(
            Purchase::new("A", "B", date).values().len(),
            Purchase::COLUMNS.len()
        );
        assert_eq!(Inventory::new("A", 1).values().len(), Inventory::COLUMNS.len());
        assert_eq!(Sale::new(1.0, date).values().len(), Sale::COLUMNS.len());
        assert_eq!(
            Miscellaneous::new("A", 1.0, date).values().len(),
            Miscellaneous::COLUMNS.len()
        );
    }

    #[test]
    fn test_every_entity_sorts_by_id() {
        for sortable in [
            Relationship::SORTABLE,
            Purchase::SORTABLE,
            Inventory::SORTABLE,
            Sale::SORTABLE,
            Miscellaneous::SORTABLE,
        ] {
            assert!(sortable.contains(&"id"));
        }
    }
}
