//! Notification recipient domain model.
//!
//! A recipient is a tenant-scoped preference: which channels to use, which
//! crossing directions to report, and optional allow-lists narrowing the
//! geofences and vehicles it cares about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FleetError, FleetResult};
use crate::models::event::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Email,
    /// Chat/messaging channel (WhatsApp, Telegram, SMS gateway, ...).
    Messaging,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Email, Channel::Messaging];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Messaging => "messaging",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    /// Address on the messaging channel (phone number, chat id, ...).
    pub messaging_address: Option<String>,
    pub channels: Vec<Channel>,
    pub alert_types: Vec<Direction>,
    /// `None` = every geofence visible to the tenant.
    pub geofence_ids: Option<Vec<Uuid>>,
    /// `None` = every vehicle.
    pub vehicle_ids: Option<Vec<Uuid>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    /// Non-blank destination address configured for `channel`.
    pub fn destination(&self, channel: Channel) -> Option<&str> {
        let address = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Messaging => self.messaging_address.as_deref(),
        };
        address.map(str::trim).filter(|a| !a.is_empty())
    }

    pub fn subscribes_to(&self, direction: Direction) -> bool {
        self.alert_types.contains(&direction)
    }

    pub fn covers_geofence(&self, geofence_id: Uuid) -> bool {
        self.geofence_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&geofence_id))
    }

    pub fn covers_vehicle(&self, vehicle_id: Uuid) -> bool {
        self.vehicle_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&vehicle_id))
    }

    /// Enabled channels that have an address, paired with that address.
    pub fn deliverable_targets(&self) -> Vec<(Channel, String)> {
        self.channels
            .iter()
            .filter_map(|channel| {
                self.destination(*channel)
                    .map(|address| (*channel, address.to_string()))
            })
            .collect()
    }
}

/// Fields required to create a new recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecipient {
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub messaging_address: Option<String>,
    pub channels: Vec<Channel>,
    pub alert_types: Vec<Direction>,
    pub geofence_ids: Option<Vec<Uuid>>,
    pub vehicle_ids: Option<Vec<Uuid>>,
}

/// Fields that can be updated on an existing recipient.
///
/// Nested options follow the usual convention: `Some(None)` clears.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRecipient {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub messaging_address: Option<Option<String>>,
    pub channels: Option<Vec<Channel>>,
    pub alert_types: Option<Vec<Direction>>,
    pub geofence_ids: Option<Option<Vec<Uuid>>>,
    pub vehicle_ids: Option<Option<Vec<Uuid>>>,
    pub active: Option<bool>,
}

/// Contact and subscription fields shared by create and update checks.
pub struct RecipientSettings<'a> {
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub messaging_address: Option<&'a str>,
    pub channels: &'a [Channel],
    pub alert_types: &'a [Direction],
}

impl RecipientSettings<'_> {
    pub fn validate(&self) -> FleetResult<()> {
        if self.name.trim().is_empty() {
            return Err(FleetError::validation("recipient name must not be blank"));
        }
        if self.channels.is_empty() {
            return Err(FleetError::validation(
                "recipient must enable at least one channel",
            ));
        }
        if self.alert_types.is_empty() {
            return Err(FleetError::validation(
                "recipient must subscribe to at least one alert type",
            ));
        }
        for channel in self.channels {
            let address = match channel {
                Channel::Email => self.email,
                Channel::Messaging => self.messaging_address,
            };
            let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) else {
                return Err(FleetError::validation(format!(
                    "channel {channel} is enabled without a destination"
                )));
            };
            if *channel == Channel::Email && !address.contains('@') {
                return Err(FleetError::validation(format!(
                    "'{address}' is not an email address"
                )));
            }
        }
        Ok(())
    }
}

impl UpdateRecipient {
    /// Whether the update changes a contact or subscription field.
    /// Allow-list and `active` changes do not.
    pub fn touches_settings(&self) -> bool {
        self.name.is_some()
            || self.email.is_some()
            || self.messaging_address.is_some()
            || self.channels.is_some()
            || self.alert_types.is_some()
    }
}

impl CreateRecipient {
    pub fn settings(&self) -> RecipientSettings<'_> {
        RecipientSettings {
            name: &self.name,
            email: self.email.as_deref(),
            messaging_address: self.messaging_address.as_deref(),
            channels: &self.channels,
            alert_types: &self.alert_types,
        }
    }
}
