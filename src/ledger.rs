//! Authority Ledger
//!
//! Resolves who the current master is and owns the persisted secondary
//! record. The primary is fixed at setup.

use std::sync::{PoisonError, RwLock};
use tracing::info;
use warden_shared::{MasterRole, PrimaryConfig, Principal, SecondaryConfig};

use crate::config::ConfigError;
use crate::records::{RecordError, RecordStore, PRIMARY_CONFIG, SECONDARY_CONFIG};

pub struct Ledger {
    records: RecordStore,
    primary: PrimaryConfig,
    secondary: RwLock<Option<SecondaryConfig>>,
}

impl Ledger {
    /// Load the primary and secondary records
    pub fn load(records: RecordStore) -> Result<Self, ConfigError> {
        let primary: PrimaryConfig = records
            .read(PRIMARY_CONFIG)?
            .ok_or_else(|| ConfigError::Unconfigured(records.dir().to_path_buf()))?;
        let secondary: Option<SecondaryConfig> = records.read(SECONDARY_CONFIG)?;

        info!(
            "Primary master: {}, secondary: {}",
            primary.master.messaging_handle,
            secondary
                .as_ref()
                .map(|s| format!("{} (active={})", s.master.messaging_handle, s.active))
                .unwrap_or_else(|| "none".into())
        );

        Ok(Self {
            records,
            primary,
            secondary: RwLock::new(secondary),
        })
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn primary(&self) -> &PrimaryConfig {
        &self.primary
    }

    /// The persisted secondary, active or not
    pub fn secondary_record(&self) -> Option<SecondaryConfig> {
        self.secondary
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_secondary_active(&self) -> bool {
        self.secondary_record().is_some_and(|s| s.active)
    }

    /// Active secondary if any, else the primary
    pub fn current_master(&self) -> Principal {
        match self.secondary_record() {
            Some(s) if s.active => s.master,
            _ => self.primary.master.clone(),
        }
    }

    pub fn current_role(&self) -> MasterRole {
        if self.is_secondary_active() {
            MasterRole::Secondary
        } else {
            MasterRole::Primary
        }
    }

    /// Role of a handle; the secondary is checked first
    pub fn role_of(&self, handle: &str) -> Option<MasterRole> {
        if self
            .secondary_record()
            .is_some_and(|s| s.master.has_handle(handle))
        {
            return Some(MasterRole::Secondary);
        }
        if self.primary.master.has_handle(handle) {
            return Some(MasterRole::Primary);
        }
        None
    }

    /// Persist `secondary` as the active secondary
    pub fn activate_secondary(&self, secondary: SecondaryConfig) -> Result<(), RecordError> {
        let record = SecondaryConfig::active(secondary.master);
        self.records.write(SECONDARY_CONFIG, &record)?;
        info!("[HANDOFF] Secondary master {} active", record.master.messaging_handle);
        *self.secondary.write().unwrap_or_else(PoisonError::into_inner) = Some(record);
        Ok(())
    }

    /// Deactivate the persisted secondary, keeping it for later reuse
    pub fn erase_secondary(&self) -> Result<(), RecordError> {
        let mut guard = self.secondary.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = guard.as_mut() {
            let inactive = SecondaryConfig {
                active: false,
                master: record.master.clone(),
            };
            self.records.write(SECONDARY_CONFIG, &inactive)?;
            *record = inactive;
            info!("[HANDOFF] Secondary master deactivated, primary is master");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(dir: &std::path::Path) -> Ledger {
        let records = RecordStore::new(dir);
        records
            .write(
                PRIMARY_CONFIG,
                &PrimaryConfig {
                    master: Principal::new("alice", "alice@example.com"),
                    device: Principal::new("warden_bot", "warden@example.com"),
                },
            )
            .unwrap();
        Ledger::load(records).unwrap()
    }

    #[test]
    fn test_missing_primary_is_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let result = Ledger::load(RecordStore::new(dir.path()));
        assert!(matches!(result, Err(ConfigError::Unconfigured(_))));
    }

    #[test]
    fn test_primary_is_master_without_secondary() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(dir.path());

        assert_eq!(ledger.current_master().messaging_handle, "alice");
        assert_eq!(ledger.current_role(), MasterRole::Primary);
        assert_eq!(ledger.role_of("ALICE"), Some(MasterRole::Primary));
        assert_eq!(ledger.role_of("mallory"), None);
    }

    #[test]
    fn test_activate_and_erase_secondary() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(dir.path());
        let bob = Principal::new("bob", "bob@example.com");

        ledger
            .activate_secondary(SecondaryConfig {
                active: false,
                master: bob.clone(),
            })
            .unwrap();
        assert_eq!(ledger.current_master(), bob);
        assert_eq!(ledger.role_of("Bob"), Some(MasterRole::Secondary));

        // Survives a reload
        let reloaded = Ledger::load(RecordStore::new(dir.path())).unwrap();
        assert!(reloaded.is_secondary_active());

        ledger.erase_secondary().unwrap();
        assert_eq!(ledger.current_role(), MasterRole::Primary);
        assert_eq!(ledger.secondary_record().map(|s| s.active), Some(false));
        // Inactive secondary is still recognized as a principal
        assert_eq!(ledger.role_of("bob"), Some(MasterRole::Secondary));
    }
}
