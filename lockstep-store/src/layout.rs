//! Persisted key layout and typed accessors.
//!
//! Keys are grouped by owner: `device.*` and `enrollment.*` are written by
//! the enrollment workflow, everything else by the reconciliation engine.

use crate::error::{StorageError, StorageResult};
use crate::value::WriteBatch;
use crate::DurableStateStore;
use chrono::{DateTime, Utc};
use lockstep_types::{
    CommandPayload, ComplianceSnapshot, DeviceId, DeviceIdentity, DisplayCache, EnrollmentState,
    LockReason, LockState,
};

pub mod keys {
    pub const DEVICE_ID: &str = "device.id";
    pub const DEVICE_SERIAL: &str = "device.serial";
    pub const DEVICE_SERIAL_SOURCE: &str = "device.serialSource";
    pub const DEVICE_LOCAL_ID: &str = "device.localId";
    pub const DEVICE_BRAND: &str = "device.brand";
    pub const DEVICE_MODEL: &str = "device.model";
    pub const DEVICE_IMEI: &str = "device.imei";
    pub const DEVICE_ENROLLED_AT: &str = "device.enrolledAt";

    pub const ENROLLMENT_STATE: &str = "enrollment.state";

    pub const LOCK_IS_LOCKED: &str = "lock.isLocked";
    pub const LOCK_REASON: &str = "lock.reason";
    pub const LOCK_UNLOCK_CODE: &str = "lock.unlockCode";
    pub const LOCK_LAST_CHANGED_AT: &str = "lock.lastChangedAt";

    pub const COMPLIANCE_NEXT_PAYMENT_DATE: &str = "compliance.nextPaymentDate";
    pub const COMPLIANCE_AMOUNT_DUE: &str = "compliance.amountDue";
    pub const COMPLIANCE_AMOUNT_PAID: &str = "compliance.amountPaid";
    pub const COMPLIANCE_PAYMENT_INSTRUCTIONS: &str = "compliance.paymentInstructions";
    pub const COMPLIANCE_CONTACT_PHONE: &str = "compliance.contactPhone";
    pub const COMPLIANCE_COMPANY_LOGO_URL: &str = "compliance.companyLogoUrl";
    pub const COMPLIANCE_MESSAGE: &str = "compliance.message";

    pub const DISPLAY_REMINDER_TITLE: &str = "display.reminderTitle";
    pub const DISPLAY_REMINDER_MESSAGE: &str = "display.reminderMessage";

    pub const CONNECTIVITY_LAST_ONLINE_AT: &str = "connectivity.lastOnlineAt";

    pub const PUSH_TOKEN: &str = "push.token";
}

fn parse_time(key: &str, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("{key}: {e}")))
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Reads a timestamp key.
pub fn load_time(store: &dyn DurableStateStore, key: &str) -> StorageResult<Option<DateTime<Utc>>> {
    store
        .get_str(key)?
        .map(|raw| parse_time(key, &raw))
        .transpose()
}

/// Adds a timestamp write to `batch`.
pub fn put_time(batch: &mut WriteBatch, key: &str, at: DateTime<Utc>) {
    batch.put(key, format_time(at));
}

// ── Lock state ───────────────────────────────────────────────────

/// Loads the persisted lock state, or `None` if none was ever written.
pub fn load_lock_state(store: &dyn DurableStateStore) -> StorageResult<Option<LockState>> {
    let Some(locked) = store.get_bool(keys::LOCK_IS_LOCKED)? else {
        return Ok(None);
    };
    let reason: LockReason = match store.get_str(keys::LOCK_REASON)? {
        Some(raw) => raw.parse()?,
        None if locked => LockReason::ServerDirective,
        None => LockReason::None,
    };
    let unlock_code = store.get_str(keys::LOCK_UNLOCK_CODE)?;
    let changed_at = load_time(store, keys::LOCK_LAST_CHANGED_AT)?.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Ok(Some(LockState::from_parts(locked, reason, unlock_code, changed_at)?))
}

/// Writes every lock field, so a transition lands as one batch.
pub fn lock_state_ops(state: &LockState) -> WriteBatch {
    let mut batch = WriteBatch::new();
    batch
        .put(keys::LOCK_IS_LOCKED, state.is_locked())
        .put(keys::LOCK_REASON, state.reason().as_str())
        .put_opt(keys::LOCK_UNLOCK_CODE, state.unlock_code());
    put_time(&mut batch, keys::LOCK_LAST_CHANGED_AT, state.last_changed_at());
    batch
}

// ── Identity ─────────────────────────────────────────────────────

/// Loads the enrolled identity, if enrollment completed.
pub fn load_identity(store: &dyn DurableStateStore) -> StorageResult<Option<DeviceIdentity>> {
    let (Some(device_id), Some(serial_number), Some(enrolled_at)) = (
        store.get_str(keys::DEVICE_ID)?,
        store.get_str(keys::DEVICE_SERIAL)?,
        load_time(store, keys::DEVICE_ENROLLED_AT)?,
    ) else {
        return Ok(None);
    };
    Ok(Some(DeviceIdentity {
        device_id: DeviceId::new(device_id),
        serial_number,
        enrolled_at,
    }))
}

pub fn identity_ops(identity: &DeviceIdentity) -> WriteBatch {
    let mut batch = WriteBatch::new();
    batch
        .put(keys::DEVICE_ID, identity.device_id.as_str())
        .put(keys::DEVICE_SERIAL, identity.serial_number.as_str());
    put_time(&mut batch, keys::DEVICE_ENROLLED_AT, identity.enrolled_at);
    batch
}

pub fn load_enrollment_state(store: &dyn DurableStateStore) -> StorageResult<EnrollmentState> {
    match store.get_str(keys::ENROLLMENT_STATE)? {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(EnrollmentState::Unenrolled),
    }
}

// ── Display cache ────────────────────────────────────────────────

/// Replaces the billing display fields with a fresh snapshot.
pub fn snapshot_ops(snapshot: &ComplianceSnapshot) -> WriteBatch {
    let mut batch = WriteBatch::new();
    batch
        .put_opt(keys::COMPLIANCE_NEXT_PAYMENT_DATE, snapshot.next_payment_date.as_deref())
        .put_opt(keys::COMPLIANCE_AMOUNT_DUE, snapshot.amount_due.as_deref())
        .put_opt(keys::COMPLIANCE_AMOUNT_PAID, snapshot.amount_paid.as_deref())
        .put_opt(
            keys::COMPLIANCE_PAYMENT_INSTRUCTIONS,
            snapshot.payment_instructions.as_deref(),
        )
        .put_opt(keys::COMPLIANCE_COMPANY_LOGO_URL, snapshot.company_logo_url.as_deref())
        .put_opt(keys::COMPLIANCE_MESSAGE, snapshot.message.as_deref());
    // The phone often arrives only with lock notices; keep the last one.
    if let Some(phone) = snapshot.contact_phone.as_deref() {
        batch.put(keys::COMPLIANCE_CONTACT_PHONE, phone);
    }
    batch
}

/// Merges the fields a reminder carries; absent fields keep their value.
pub fn reminder_ops(payload: &CommandPayload) -> WriteBatch {
    let mut batch = WriteBatch::new();
    let fields = [
        (keys::DISPLAY_REMINDER_TITLE, &payload.title),
        (keys::DISPLAY_REMINDER_MESSAGE, &payload.message),
        (keys::COMPLIANCE_NEXT_PAYMENT_DATE, &payload.next_payment_date),
        (keys::COMPLIANCE_AMOUNT_DUE, &payload.amount_due),
        (keys::COMPLIANCE_AMOUNT_PAID, &payload.amount_paid),
        (keys::COMPLIANCE_PAYMENT_INSTRUCTIONS, &payload.payment_instructions),
        (keys::COMPLIANCE_CONTACT_PHONE, &payload.contact_phone),
    ];
    for (key, value) in fields {
        if let Some(v) = value {
            batch.put(key, v.as_str());
        }
    }
    batch
}

/// Reads the display cache, substituting defaults for absent fields.
pub fn load_display_cache(store: &dyn DurableStateStore) -> StorageResult<DisplayCache> {
    let defaults = DisplayCache::default();
    Ok(DisplayCache {
        next_payment_date: store
            .get_str(keys::COMPLIANCE_NEXT_PAYMENT_DATE)?
            .unwrap_or(defaults.next_payment_date),
        amount_due: store
            .get_str(keys::COMPLIANCE_AMOUNT_DUE)?
            .unwrap_or(defaults.amount_due),
        amount_paid: store
            .get_str(keys::COMPLIANCE_AMOUNT_PAID)?
            .unwrap_or(defaults.amount_paid),
        payment_instructions: store
            .get_str(keys::COMPLIANCE_PAYMENT_INSTRUCTIONS)?
            .unwrap_or(defaults.payment_instructions),
        contact_phone: store
            .get_str(keys::COMPLIANCE_CONTACT_PHONE)?
            .unwrap_or(defaults.contact_phone),
        company_logo_url: store.get_str(keys::COMPLIANCE_COMPANY_LOGO_URL)?,
        message: store.get_str(keys::COMPLIANCE_MESSAGE)?,
        reminder_title: store.get_str(keys::DISPLAY_REMINDER_TITLE)?,
        reminder_message: store.get_str(keys::DISPLAY_REMINDER_MESSAGE)?,
    })
}
