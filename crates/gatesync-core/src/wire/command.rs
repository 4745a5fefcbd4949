//! Outbound command formatting.
//!
//! Builds the exact payload bytes a terminal expects for each high-level
//! operation, and validates payload material before it may be enqueued.
//! Every biometric put is emitted as unified `DATA UPDATE BIODATA`
//! regardless of the tag it arrived under; that single dialect is what
//! keeps a mixed-firmware fleet consistent.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{
    BioDataRecord, BioPhotoRecord, BioType, CommandCategory, IdCardRecord, Record, SmsRecord,
    UserPicRecord, UserRecord, UserSmsRecord, WorkCodeRecord,
};

/// Template blobs are printable base64 text: padding only at the end.
static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").expect("static regex is valid"));

/// A payload failed validation and must not be enqueued. The caller
/// records the record as skipped in the sync log.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("PIN must not be empty")]
    EmptyPin,

    #[error("Unknown biometric type code: {0}")]
    UnknownBioType(i64),

    #[error("Template must not be empty")]
    EmptyTemplate,

    #[error("Template is not printable base64 text")]
    MalformedTemplate,

    #[error("Fingerprint slot {0} out of range 0..=9")]
    FingerprintSlot(i64),

    #[error("Face slot {0} must be 0")]
    FaceSlot(i64),

    #[error("Slot/index must be non-negative, got {0}")]
    NegativeIndex(i64),

    #[error("Record key must not be empty")]
    EmptyKey,

    #[error("{0} records are never propagated")]
    NotPropagated(&'static str),
}

/// A formatted outbound command ready for a terminal queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOp {
    pub category: CommandCategory,
    pub payload: String,
}

impl CommandOp {
    fn data(payload: String) -> Self {
        Self {
            category: CommandCategory::Data,
            payload,
        }
    }
}

/// DATA UPDATE / DATA DELETE payloads are upserts and deletes by primary
/// key on the terminal; re-delivery is safe.
pub fn is_idempotent(payload: &str) -> bool {
    payload.starts_with("DATA UPDATE") || payload.starts_with("DATA DELETE")
}

/// Translate an inbound upload record into the outbound command for peers.
///
/// Legacy biometric tags collapse to the unified BIODATA form: FP becomes
/// type 1, FACE type 2, FVEIN type 7. Photo records format like any other
/// (whether they are propagated at all is the fan-out's decision).
pub fn record_update(record: &Record) -> Result<CommandOp, FormatError> {
    match record {
        Record::User(u) => user_update(u),
        Record::Fingerprint(fp) => bio_update(&fp.into()),
        Record::Face(face) => bio_update(&face.into()),
        Record::FingerVein(fv) => bio_update(&fv.into()),
        Record::BioData(b) => bio_update(b),
        Record::WorkCode(w) => workcode_update(w),
        Record::Sms(s) => sms_update(s),
        Record::UserSms(us) => user_sms_update(us),
        Record::IdCard(c) => idcard_update(c),
        Record::UserPic(p) => userpic_update(p),
        Record::BioPhoto(p) => biophoto_update(p),
        Record::ErrorLog(_) => Err(FormatError::NotPropagated("ERRORLOG")),
    }
}

/// `DATA UPDATE USERINFO` with the full user field set.
pub fn user_update(user: &UserRecord) -> Result<CommandOp, FormatError> {
    if user.pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }

    Ok(CommandOp::data(format!(
        "DATA UPDATE USERINFO PIN={}\tName={}\tPri={}\tPasswd={}\tCard={}\tGrp={}\tTZ={}\tVerify={}\tViceCard={}",
        user.pin,
        user.name,
        user.privilege,
        user.password,
        user.card,
        user.group,
        user.time_zone,
        user.verify_mode,
        user.vice_card,
    )))
}

/// `DATA DELETE USERINFO` — the terminal cascades to the user's templates.
pub fn user_delete(pin: &str) -> Result<CommandOp, FormatError> {
    if pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }
    Ok(CommandOp::data(format!("DATA DELETE USERINFO PIN={pin}")))
}

/// `DATA UPDATE BIODATA` in the canonical 10-field order.
///
/// `MajorVer`, `MinorVer` and `Format` are emitted verbatim; sites send
/// both the numeric `0` and the string `ZK` and the terminal cares which.
pub fn bio_update(bio: &BioDataRecord) -> Result<CommandOp, FormatError> {
    validate_bio(bio)?;

    Ok(CommandOp::data(format!(
        "DATA UPDATE BIODATA Pin={}\tNo={}\tIndex={}\tValid={}\tDuress={}\tType={}\tMajorVer={}\tMinorVer={}\tFormat={}\tTmp={}",
        bio.pin,
        bio.no,
        bio.index,
        bio.valid,
        bio.duress,
        bio.bio_type,
        bio.major_ver,
        bio.minor_ver,
        bio.format,
        bio.template,
    )))
}

/// `DATA DELETE BIODATA Pin=<p>[\tType=<t>[\tNo=<n>]]`.
pub fn bio_delete(
    pin: &str,
    bio_type: Option<i64>,
    no: Option<i64>,
) -> Result<CommandOp, FormatError> {
    if pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }

    let mut payload = format!("DATA DELETE BIODATA Pin={pin}");
    if let Some(t) = bio_type {
        BioType::from_code(t).ok_or(FormatError::UnknownBioType(t))?;
        let _ = write!(payload, "\tType={t}");
        if let Some(n) = no {
            let _ = write!(payload, "\tNo={n}");
        }
    }
    Ok(CommandOp::data(payload))
}

/// `DATA QUERY BIODATA Type=<t>[\tPIN=<p>[\tNo=<n>]]`.
///
/// The query dialect uses upper-case `PIN` where every other BIODATA form
/// uses `Pin`; this matches the behaviour verified on-wire against target
/// firmware.
pub fn bio_query(
    bio_type: i64,
    pin: Option<&str>,
    no: Option<i64>,
) -> Result<CommandOp, FormatError> {
    BioType::from_code(bio_type).ok_or(FormatError::UnknownBioType(bio_type))?;

    let mut payload = format!("DATA QUERY BIODATA Type={bio_type}");
    if let Some(p) = pin {
        let _ = write!(payload, "\tPIN={p}");
        if let Some(n) = no {
            let _ = write!(payload, "\tNo={n}");
        }
    }
    Ok(CommandOp::data(payload))
}

pub fn workcode_update(wc: &WorkCodeRecord) -> Result<CommandOp, FormatError> {
    if wc.code.is_empty() {
        return Err(FormatError::EmptyKey);
    }
    Ok(CommandOp::data(format!(
        "DATA UPDATE WORKCODE PIN={}\tCODE={}\tNAME={}",
        wc.pin, wc.code, wc.name,
    )))
}

pub fn sms_update(sms: &SmsRecord) -> Result<CommandOp, FormatError> {
    if sms.uid.is_empty() {
        return Err(FormatError::EmptyKey);
    }
    Ok(CommandOp::data(format!(
        "DATA UPDATE SMS MSG={}\tTAG={}\tUID={}\tMIN={}\tStartTime={}",
        sms.content, sms.tag, sms.uid, sms.min_duration, sms.start_time,
    )))
}

pub fn user_sms_update(us: &UserSmsRecord) -> Result<CommandOp, FormatError> {
    if us.pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }
    if us.uid.is_empty() {
        return Err(FormatError::EmptyKey);
    }
    Ok(CommandOp::data(format!(
        "DATA UPDATE USER_SMS PIN={}\tUID={}",
        us.pin, us.uid,
    )))
}

pub fn idcard_update(card: &IdCardRecord) -> Result<CommandOp, FormatError> {
    if card.id_num.is_empty() {
        return Err(FormatError::EmptyKey);
    }
    Ok(CommandOp::data(format!(
        "DATA UPDATE IDCARD PIN={}\tSNNum={}\tIDNum={}\tDNNum={}\tName={}\tGender={}\tNation={}\tBirthday={}\tValidInfo={}\tAddress={}\tAdditionalInfo={}\tIssuer={}\tPhoto={}\tFPTemplate1={}\tFPTemplate2={}\tReserve={}\tNotice={}",
        card.pin,
        card.sn_num,
        card.id_num,
        card.dn_num,
        card.name,
        card.gender,
        card.nation,
        card.birthday,
        card.valid_info,
        card.address,
        card.additional_info,
        card.issuer,
        card.photo,
        card.fp_template1,
        card.fp_template2,
        card.reserve,
        card.notice,
    )))
}

pub fn userpic_update(pic: &UserPicRecord) -> Result<CommandOp, FormatError> {
    if pic.pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }
    Ok(CommandOp::data(format!(
        "DATA UPDATE USERPIC PIN={}\tFileName={}\tSize={}\tContent={}",
        pic.pin, pic.file_name, pic.size, pic.content,
    )))
}

pub fn biophoto_update(photo: &BioPhotoRecord) -> Result<CommandOp, FormatError> {
    if photo.pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }
    Ok(CommandOp::data(format!(
        "DATA UPDATE BIOPHOTO PIN={}\tType={}\tFileName={}\tSize={}\tContent={}",
        photo.pin, photo.bio_type, photo.file_name, photo.size, photo.content,
    )))
}

// === Control operations ===

pub fn reboot() -> CommandOp {
    CommandOp {
        category: CommandCategory::Control,
        payload: "REBOOT".to_string(),
    }
}

pub fn unlock_door() -> CommandOp {
    CommandOp {
        category: CommandCategory::Control,
        payload: "AC_UNLOCK".to_string(),
    }
}

pub fn cancel_alarm() -> CommandOp {
    CommandOp {
        category: CommandCategory::Control,
        payload: "AC_UNALARM".to_string(),
    }
}

pub fn set_option(key: &str, value: &str) -> CommandOp {
    CommandOp {
        category: CommandCategory::Config,
        payload: format!("SET OPTION {key}={value}"),
    }
}

pub fn reload_options() -> CommandOp {
    CommandOp {
        category: CommandCategory::Config,
        payload: "RELOAD OPTIONS".to_string(),
    }
}

pub fn query_info() -> CommandOp {
    CommandOp {
        category: CommandCategory::Info,
        payload: "INFO".to_string(),
    }
}

/// `ENROLL_BIO` — ask the terminal to capture a template on the spot.
pub fn enroll_bio(pin: &str, bio_type: i64, retry: i64) -> Result<CommandOp, FormatError> {
    if pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }
    BioType::from_code(bio_type).ok_or(FormatError::UnknownBioType(bio_type))?;

    Ok(CommandOp {
        category: CommandCategory::Enroll,
        payload: format!("ENROLL_BIO TYPE={bio_type}\tPIN={pin}\tRETRY={retry}\tOVERWRITE=1"),
    })
}

/// Validate biometric payload material against the enqueue rules: PIN
/// non-empty, type in the enumeration, template non-empty printable
/// base64, slot within the family's range.
pub fn validate_bio(bio: &BioDataRecord) -> Result<(), FormatError> {
    if bio.pin.is_empty() {
        return Err(FormatError::EmptyPin);
    }

    let bio_type =
        BioType::from_code(bio.bio_type).ok_or(FormatError::UnknownBioType(bio.bio_type))?;

    if bio.template.is_empty() {
        return Err(FormatError::EmptyTemplate);
    }
    if !TEMPLATE_RE.is_match(&bio.template) {
        return Err(FormatError::MalformedTemplate);
    }

    if bio.no < 0 || bio.index < 0 {
        return Err(FormatError::NegativeIndex(bio.no.min(bio.index)));
    }
    match bio_type {
        BioType::Fingerprint if bio.no > 9 => Err(FormatError::FingerprintSlot(bio.no)),
        BioType::Face if bio.no != 0 => Err(FormatError::FaceSlot(bio.no)),
        _ => Ok(()),
    }
}
