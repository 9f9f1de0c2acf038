use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DeliveryId, DomainError, DomainResult, Entity, SupplierId};

use crate::person::{next_code, ContactInfo};

/// A supplier goods are received from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    id: SupplierId,
    code: String,
    legal_name: String,
    tax_id: Option<String>,
    contact: ContactInfo,
    registered_at: DateTime<Utc>,
}

impl Supplier {
    pub fn new(
        id: SupplierId,
        code: String,
        legal_name: String,
        tax_id: Option<String>,
        contact: ContactInfo,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if legal_name.trim().is_empty() {
            return Err(DomainError::validation("legal name cannot be empty"));
        }
        if code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }

        Ok(Self {
            id,
            code,
            legal_name,
            tax_id,
            contact,
            registered_at,
        })
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn legal_name(&self) -> &str {
        &self.legal_name
    }

    pub fn tax_id(&self) -> Option<&str> {
        self.tax_id.as_deref()
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A recorded receipt of goods from a supplier. Entry movements link to
/// one of these for provenance; the delivery itself carries no stock
/// arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub supplier_id: SupplierId,
    pub invoice_no: String,
    pub description: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Lookup port for supplier and delivery provenance.
pub trait SupplierDirectory: Send + Sync {
    fn supplier(&self, supplier_id: SupplierId) -> Option<Supplier>;

    fn delivery(&self, delivery_id: DeliveryId) -> Option<Delivery>;
}

impl<D> SupplierDirectory for Arc<D>
where
    D: SupplierDirectory + ?Sized,
{
    fn supplier(&self, supplier_id: SupplierId) -> Option<Supplier> {
        (**self).supplier(supplier_id)
    }

    fn delivery(&self, delivery_id: DeliveryId) -> Option<Delivery> {
        (**self).delivery(delivery_id)
    }
}

/// In-memory supplier directory for tests/dev.
///
/// Codes are sequential within the directory: PRV001, PRV002, ...
#[derive(Debug, Default)]
pub struct InMemorySupplierDirectory {
    suppliers: RwLock<HashMap<SupplierId, Supplier>>,
    deliveries: RwLock<HashMap<DeliveryId, Delivery>>,
}

impl InMemorySupplierDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        legal_name: impl Into<String>,
        tax_id: Option<String>,
        contact: ContactInfo,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Supplier> {
        let mut map = self
            .suppliers
            .write()
            .map_err(|_| DomainError::invariant("supplier directory lock poisoned"))?;

        let code = next_code("PRV", map.values().map(Supplier::code));
        let supplier = Supplier::new(
            SupplierId::new(),
            code,
            legal_name.into(),
            tax_id,
            contact,
            registered_at,
        )?;
        map.insert(supplier.id_typed(), supplier.clone());
        Ok(supplier)
    }

    /// Record a delivery from a known supplier.
    pub fn record_delivery(
        &self,
        supplier_id: SupplierId,
        invoice_no: impl Into<String>,
        description: Option<String>,
        received_at: DateTime<Utc>,
    ) -> DomainResult<Delivery> {
        let suppliers = self
            .suppliers
            .read()
            .map_err(|_| DomainError::invariant("supplier directory lock poisoned"))?;
        if !suppliers.contains_key(&supplier_id) {
            return Err(DomainError::validation(format!(
                "unknown supplier {supplier_id}"
            )));
        }
        drop(suppliers);

        let invoice_no = invoice_no.into();
        if invoice_no.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }

        let delivery = Delivery {
            id: DeliveryId::new(),
            supplier_id,
            invoice_no,
            description,
            received_at,
        };

        let mut deliveries = self
            .deliveries
            .write()
            .map_err(|_| DomainError::invariant("supplier directory lock poisoned"))?;
        deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    pub fn list(&self) -> Vec<Supplier> {
        let map = match self.suppliers.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        let mut suppliers: Vec<Supplier> = map.values().cloned().collect();
        suppliers.sort_by(|a, b| a.code().cmp(b.code()));
        suppliers
    }

    pub fn deliveries_from(&self, supplier_id: SupplierId) -> Vec<Delivery> {
        let map = match self.deliveries.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        let mut rows: Vec<Delivery> = map
            .values()
            .filter(|d| d.supplier_id == supplier_id)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.received_at);
        rows
    }
}

impl SupplierDirectory for InMemorySupplierDirectory {
    fn supplier(&self, supplier_id: SupplierId) -> Option<Supplier> {
        let map = self.suppliers.read().ok()?;
        map.get(&supplier_id).cloned()
    }

    fn delivery(&self, delivery_id: DeliveryId) -> Option<Delivery> {
        let map = self.deliveries.read().ok()?;
        map.get(&delivery_id).cloned()
    }
}
