//! Recipient service: tenant-scoped notification preferences.

use fleetwatch_core::access::Caller;
use fleetwatch_core::error::{FleetError, FleetResult};
use fleetwatch_core::models::audit::RequestMeta;
use fleetwatch_core::models::recipient::{
    CreateRecipient, Recipient, RecipientSettings, UpdateRecipient,
};
use fleetwatch_core::repository::{
    AuditLogRepository, PaginatedResult, Pagination, RecipientRepository, TenantRepository,
};
use tracing::info;
use uuid::Uuid;

use crate::audit::{Actor, AuditRecorder};
use crate::error::AlertError;

const RESOURCE: &str = "recipient";

pub struct RecipientService<R, T, A>
where
    R: RecipientRepository,
    T: TenantRepository,
    A: AuditLogRepository,
{
    recipients: R,
    tenants: T,
    audit: AuditRecorder<A>,
}

impl<R, T, A> RecipientService<R, T, A>
where
    R: RecipientRepository,
    T: TenantRepository,
    A: AuditLogRepository,
{
    pub fn new(recipients: R, tenants: T, audit: AuditRecorder<A>) -> Self {
        Self {
            recipients,
            tenants,
            audit,
        }
    }

    /// Create a recipient. Tenant users always create for their own
    /// tenant; operators create for `input.tenant_id`.
    pub async fn create(
        &self,
        caller: &Caller,
        mut input: CreateRecipient,
        request: RequestMeta,
    ) -> FleetResult<Recipient> {
        input.tenant_id = caller.recipient_tenant(Some(input.tenant_id))?;
        input.name = input.name.trim().to_string();
        input.settings().validate()?;
        self.ensure_tenant(input.tenant_id).await?;

        let recipient = self.recipients.create(input).await?;
        info!(recipient_id = %recipient.id, tenant_id = %recipient.tenant_id, "Recipient created");

        self.audit
            .record(
                Actor::Caller(caller),
                "recipient.create",
                RESOURCE,
                Some(recipient.id.to_string()),
                Some(serde_json::json!({
                    "tenant_id": recipient.tenant_id,
                    "channels": recipient.channels,
                })),
                request,
            )
            .await;
        Ok(recipient)
    }

    pub async fn get(
        &self,
        caller: &Caller,
        tenant_id: Option<Uuid>,
        id: Uuid,
    ) -> FleetResult<Recipient> {
        let tenant_id = caller.recipient_tenant(tenant_id)?;
        self.recipients.get_by_id(tenant_id, id).await
    }

    pub async fn list(
        &self,
        caller: &Caller,
        tenant_id: Option<Uuid>,
        pagination: Pagination,
    ) -> FleetResult<PaginatedResult<Recipient>> {
        let tenant_id = caller.recipient_tenant(tenant_id)?;
        self.recipients.list(tenant_id, pagination).await
    }

    /// Update preferences. When a contact or subscription field changes,
    /// the merged result must pass validation; toggling `active` or the
    /// allow-lists does not re-check stored settings.
    pub async fn update(
        &self,
        caller: &Caller,
        tenant_id: Option<Uuid>,
        id: Uuid,
        input: UpdateRecipient,
        request: RequestMeta,
    ) -> FleetResult<Recipient> {
        let tenant_id = caller.recipient_tenant(tenant_id)?;
        let current = self.recipients.get_by_id(tenant_id, id).await?;
        if input.touches_settings() {
            Self::validate_merged(&current, &input)?;
        }

        let action = if input.active == Some(false) && current.active {
            "recipient.deactivate"
        } else {
            "recipient.update"
        };
        let input = UpdateRecipient {
            name: input.name.map(|n| n.trim().to_string()),
            ..input
        };
        let updated = self.recipients.update(tenant_id, id, input).await?;

        self.audit
            .record(
                Actor::Caller(caller),
                action,
                RESOURCE,
                Some(id.to_string()),
                Some(serde_json::json!({ "tenant_id": tenant_id })),
                request,
            )
            .await;
        Ok(updated)
    }

    fn validate_merged(current: &Recipient, input: &UpdateRecipient) -> FleetResult<()> {
        let name = input.name.as_deref().unwrap_or(&current.name);
        let email = match &input.email {
            Some(email) => email.as_deref(),
            None => current.email.as_deref(),
        };
        let messaging_address = match &input.messaging_address {
            Some(address) => address.as_deref(),
            None => current.messaging_address.as_deref(),
        };
        RecipientSettings {
            name,
            email,
            messaging_address,
            channels: input.channels.as_deref().unwrap_or(&current.channels),
            alert_types: input.alert_types.as_deref().unwrap_or(&current.alert_types),
        }
        .validate()
    }

    /// Soft removal: the recipient stops matching but is kept.
    pub async fn deactivate(
        &self,
        caller: &Caller,
        tenant_id: Option<Uuid>,
        id: Uuid,
        request: RequestMeta,
    ) -> FleetResult<Recipient> {
        let input = UpdateRecipient {
            active: Some(false),
            ..Default::default()
        };
        self.update(caller, tenant_id, id, input, request).await
    }

    pub async fn delete(
        &self,
        caller: &Caller,
        tenant_id: Option<Uuid>,
        id: Uuid,
        request: RequestMeta,
    ) -> FleetResult<()> {
        let tenant_id = caller.recipient_tenant(tenant_id)?;
        self.recipients.delete(tenant_id, id).await?;

        self.audit
            .record(
                Actor::Caller(caller),
                "recipient.delete",
                RESOURCE,
                Some(id.to_string()),
                Some(serde_json::json!({ "tenant_id": tenant_id })),
                request,
            )
            .await;
        Ok(())
    }

    async fn ensure_tenant(&self, tenant_id: Uuid) -> FleetResult<()> {
        match self.tenants.get_by_id(tenant_id).await {
            Ok(_) => Ok(()),
            Err(FleetError::NotFound { .. }) => Err(AlertError::UnknownTenant(tenant_id).into()),
            Err(e) => Err(e),
        }
    }
}
