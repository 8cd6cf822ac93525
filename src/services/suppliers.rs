use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{consts, ensure_allowed, Authorizer};
use crate::context::{Actor, Clock};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::models::{NewSupplier, Supplier, SupplierUpdate};
use crate::repositories::SupplierRepository;

const RESOURCE: &str = "suppliers";

/// Reference data for every other component.
///
/// Reads go through a local cache keyed by supplier id. The cache is only
/// authoritative until the next administrative write or an explicit
/// [`SupplierDirectory::refresh`].
pub struct SupplierDirectory {
    repo: Arc<dyn SupplierRepository>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    events: Arc<EventSender>,
    cache: DashMap<Uuid, Supplier>,
}

impl SupplierDirectory {
    pub fn new(
        repo: Arc<dyn SupplierRepository>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        events: Arc<EventSender>,
    ) -> Self {
        Self {
            repo,
            authorizer,
            clock,
            events,
            cache: DashMap::new(),
        }
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.id, name = %input.name))]
    pub async fn create_supplier(
        &self,
        actor: &Actor,
        input: NewSupplier,
    ) -> Result<Supplier, ServiceError> {
        input.validate()?;
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Supplier name is required".to_string(),
            ));
        }
        ensure_allowed(self.authorizer.as_ref(), actor, consts::SUPPLIERS_MANAGE, RESOURCE).await?;

        let supplier = Supplier::new(input, self.clock.now());
        self.repo.insert_supplier(&supplier).await?;
        self.cache.insert(supplier.id, supplier.clone());

        metrics::SUPPLIERS_CREATED.inc();
        self.events
            .send_or_log(Event::SupplierCreated(supplier.id))
            .await;
        info!(supplier_id = %supplier.id, "Supplier created");
        Ok(supplier)
    }

    /// Administrative edit. Orders and invoices keep the name and due dates
    /// they were created with.
    #[instrument(skip(self, actor, update), fields(actor = %actor.id, supplier_id = %id))]
    pub async fn update_supplier(
        &self,
        actor: &Actor,
        id: Uuid,
        update: SupplierUpdate,
    ) -> Result<Supplier, ServiceError> {
        update.validate()?;
        if matches!(update.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(ServiceError::ValidationError(
                "Supplier name cannot be blank".to_string(),
            ));
        }
        ensure_allowed(self.authorizer.as_ref(), actor, consts::SUPPLIERS_MANAGE, &id.to_string())
            .await?;

        let mut supplier = self.load(id).await?;
        supplier.apply_update(update, self.clock.now());
        self.store(supplier).await
    }

    pub async fn activate_supplier(&self, actor: &Actor, id: Uuid) -> Result<Supplier, ServiceError> {
        self.set_active(actor, id, true).await
    }

    /// Inactive suppliers cannot get new orders; existing records stay valid.
    pub async fn deactivate_supplier(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Supplier, ServiceError> {
        self.set_active(actor, id, false).await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    async fn set_active(&self, actor: &Actor, id: Uuid, active: bool) -> Result<Supplier, ServiceError> {
        ensure_allowed(self.authorizer.as_ref(), actor, consts::SUPPLIERS_MANAGE, &id.to_string())
            .await?;
        let mut supplier = self.load(id).await?;
        if supplier.active == active {
            return Ok(supplier);
        }
        supplier.active = active;
        supplier.updated_at = self.clock.now();
        self.store(supplier).await
    }

    /// Removes the directory entry. Orders, receipts, invoices and payables
    /// that reference the supplier are left in place.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_supplier(&self, actor: &Actor, id: Uuid) -> Result<(), ServiceError> {
        ensure_allowed(self.authorizer.as_ref(), actor, consts::SUPPLIERS_MANAGE, &id.to_string())
            .await?;
        self.cache.remove(&id);
        if !self.repo.delete_supplier(id).await? {
            return Err(ServiceError::not_found("supplier", id));
        }
        info!(supplier_id = %id, "Supplier deleted");
        Ok(())
    }

    pub async fn get_supplier(&self, id: Uuid) -> Result<Supplier, ServiceError> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(cached.clone());
        }
        self.load(id).await
    }

    pub async fn list_active_suppliers(&self) -> Result<Vec<Supplier>, ServiceError> {
        let mut suppliers: Vec<Supplier> = self
            .repo
            .list_suppliers()
            .await?
            .into_iter()
            .filter(|s| s.active)
            .collect();
        suppliers.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(suppliers)
    }

    pub async fn list_suppliers(
        &self,
        search_text: Option<&str>,
    ) -> Result<Vec<Supplier>, ServiceError> {
        let mut suppliers: Vec<Supplier> = self
            .repo
            .list_suppliers()
            .await?
            .into_iter()
            .filter(|s| search_text.map_or(true, |text| s.matches_search(text)))
            .collect();
        suppliers.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(suppliers)
    }

    /// Drops every cached entry; the next read goes to the repository.
    pub fn refresh(&self) {
        self.cache.clear();
    }

    async fn load(&self, id: Uuid) -> Result<Supplier, ServiceError> {
        let supplier = self
            .repo
            .get_supplier(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("supplier", id))?;
        self.cache.insert(id, supplier.clone());
        Ok(supplier)
    }

    async fn store(&self, supplier: Supplier) -> Result<Supplier, ServiceError> {
        if !self.repo.update_supplier(&supplier).await? {
            self.cache.remove(&supplier.id);
            return Err(ServiceError::not_found("supplier", supplier.id));
        }
        self.cache.insert(supplier.id, supplier.clone());
        Ok(supplier)
    }
}
