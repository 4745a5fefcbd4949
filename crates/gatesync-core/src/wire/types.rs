//! Typed records for the push protocol.
//!
//! Inbound records arrive as loose `key=value` maps; each wire tag is
//! modelled as a variant with a typed field set so the rest of the system
//! never touches raw maps.

use serde::{Deserialize, Serialize};

/// Biometric template families, as carried on the wire in the unified
/// BIODATA dialect. The integer codes are authoritative across the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BioType {
    Fingerprint,
    Face,
    Voiceprint,
    Iris,
    Retina,
    Palmprint,
    FingerVein,
    Palm,
    VisibleFace,
}

impl BioType {
    /// Resolve a wire code to a biometric type.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Fingerprint),
            2 => Some(Self::Face),
            3 => Some(Self::Voiceprint),
            4 => Some(Self::Iris),
            5 => Some(Self::Retina),
            6 => Some(Self::Palmprint),
            7 => Some(Self::FingerVein),
            8 => Some(Self::Palm),
            9 => Some(Self::VisibleFace),
            _ => None,
        }
    }

    /// The integer code used on the wire and in storage.
    pub const fn code(self) -> i64 {
        match self {
            Self::Fingerprint => 1,
            Self::Face => 2,
            Self::Voiceprint => 3,
            Self::Iris => 4,
            Self::Retina => 5,
            Self::Palmprint => 6,
            Self::FingerVein => 7,
            Self::Palm => 8,
            Self::VisibleFace => 9,
        }
    }
}

/// Outbound command categories, stored alongside each queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandCategory {
    Data,
    Control,
    Clear,
    Config,
    Info,
    Enroll,
    File,
    System,
    Upgrade,
    Check,
    Log,
    Verify,
}

impl CommandCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Control => "CONTROL",
            Self::Clear => "CLEAR",
            Self::Config => "CONFIG",
            Self::Info => "INFO",
            Self::Enroll => "ENROLL",
            Self::File => "FILE",
            Self::System => "SYSTEM",
            Self::Upgrade => "UPGRADE",
            Self::Check => "CHECK",
            Self::Log => "LOG",
            Self::Verify => "VERIFY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DATA" => Some(Self::Data),
            "CONTROL" => Some(Self::Control),
            "CLEAR" => Some(Self::Clear),
            "CONFIG" => Some(Self::Config),
            "INFO" => Some(Self::Info),
            "ENROLL" => Some(Self::Enroll),
            "FILE" => Some(Self::File),
            "SYSTEM" => Some(Self::System),
            "UPGRADE" => Some(Self::Upgrade),
            "CHECK" => Some(Self::Check),
            "LOG" => Some(Self::Log),
            "VERIFY" => Some(Self::Verify),
            _ => None,
        }
    }

    /// Derive the category from an outbound payload's leading verb.
    pub fn infer(payload: &str) -> Self {
        let verb = payload.trim_start();
        if verb.starts_with("DATA") {
            Self::Data
        } else if verb.starts_with("CLEAR") {
            Self::Clear
        } else if verb.starts_with("SET OPTION") || verb.starts_with("RELOAD OPTIONS") {
            Self::Config
        } else if verb.starts_with("INFO") {
            Self::Info
        } else if verb.starts_with("ENROLL_") {
            Self::Enroll
        } else if verb.starts_with("GetFile") || verb.starts_with("PutFile") {
            Self::File
        } else if verb.starts_with("SHELL") {
            Self::System
        } else if verb.starts_with("UPGRADE") {
            Self::Upgrade
        } else if verb.starts_with("CHECK") {
            Self::Check
        } else if verb.starts_with("LOG") {
            Self::Log
        } else if verb.starts_with("VERIFY SUM") || verb.starts_with("PostVerifyData") {
            Self::Verify
        } else {
            // REBOOT, AC_UNLOCK, AC_UNALARM and anything unrecognized
            Self::Control
        }
    }
}

/// A user enrollment record (`USER` tag, `OPERLOG` table).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub pin: String,
    pub name: String,
    pub privilege: i64,
    pub password: String,
    pub card: String,
    pub group: String,
    /// Weekly time-zone bitmask, 16 hex chars. Empty means "all zeros".
    pub time_zone: String,
    /// Verify-mode code; -1 means "use group setting".
    pub verify_mode: i64,
    pub vice_card: String,
}

/// Legacy fingerprint template (`FP` tag). `Size`/`Valid` mixed case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub pin: String,
    pub fid: i64,
    pub size: i64,
    pub valid: i64,
    pub template: String,
}

/// Legacy face template (`FACE` tag). `SIZE`/`VALID` upper case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceRecord {
    pub pin: String,
    pub fid: i64,
    pub size: i64,
    pub valid: i64,
    pub template: String,
}

/// Legacy finger-vein template (`FVEIN` tag). Uses `Pin` like BIODATA.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerVeinRecord {
    pub pin: String,
    pub fid: i64,
    pub index: i64,
    pub size: i64,
    pub valid: i64,
    pub template: String,
}

/// Unified biometric template (`BIODATA` tag).
///
/// Algorithm versions and `Format` are kept verbatim: sites send both the
/// numeric `0` and the string `ZK`, and the formatter must not coerce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BioDataRecord {
    pub pin: String,
    /// Slot position ("No"): fingerprint 0..9, face 0.
    pub no: i64,
    /// Template index within the slot.
    pub index: i64,
    pub valid: i64,
    pub duress: i64,
    pub bio_type: i64,
    pub major_ver: String,
    pub minor_ver: String,
    pub format: String,
    pub template: String,
}

impl Default for BioDataRecord {
    fn default() -> Self {
        Self {
            pin: String::new(),
            no: 0,
            index: 0,
            valid: 1,
            duress: 0,
            bio_type: 0,
            major_ver: "0".to_string(),
            minor_ver: "0".to_string(),
            format: "0".to_string(),
            template: String::new(),
        }
    }
}

impl From<&FingerprintRecord> for BioDataRecord {
    fn from(fp: &FingerprintRecord) -> Self {
        Self {
            pin: fp.pin.clone(),
            no: fp.fid,
            index: 0,
            valid: fp.valid,
            duress: 0,
            bio_type: BioType::Fingerprint.code(),
            major_ver: "0".to_string(),
            minor_ver: "0".to_string(),
            format: "ZK".to_string(),
            template: fp.template.clone(),
        }
    }
}

impl From<&FaceRecord> for BioDataRecord {
    fn from(face: &FaceRecord) -> Self {
        Self {
            pin: face.pin.clone(),
            no: face.fid,
            index: 0,
            valid: face.valid,
            duress: 0,
            bio_type: BioType::Face.code(),
            major_ver: "0".to_string(),
            minor_ver: "0".to_string(),
            format: "ZK".to_string(),
            template: face.template.clone(),
        }
    }
}

impl From<&FingerVeinRecord> for BioDataRecord {
    fn from(fv: &FingerVeinRecord) -> Self {
        Self {
            pin: fv.pin.clone(),
            no: fv.fid,
            index: fv.index,
            valid: fv.valid,
            duress: 0,
            bio_type: BioType::FingerVein.code(),
            major_ver: "0".to_string(),
            minor_ver: "0".to_string(),
            format: "ZK".to_string(),
            template: fv.template.clone(),
        }
    }
}

/// User photo (`USERPIC` tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPicRecord {
    pub pin: String,
    pub file_name: String,
    pub size: i64,
    pub content: String,
}

/// Comparison photo (`BIOPHOTO` tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BioPhotoRecord {
    pub pin: String,
    pub bio_type: i64,
    pub file_name: String,
    pub size: i64,
    pub content: String,
}

/// Government ID-card record (`IDCARD` tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdCardRecord {
    pub pin: String,
    pub sn_num: String,
    pub id_num: String,
    pub dn_num: String,
    pub name: String,
    pub gender: String,
    pub nation: String,
    pub birthday: String,
    pub valid_info: String,
    pub address: String,
    pub additional_info: String,
    pub issuer: String,
    pub photo: String,
    pub fp_template1: String,
    pub fp_template2: String,
    pub reserve: String,
    pub notice: String,
}

/// Work code (`WORKCODE` tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkCodeRecord {
    pub pin: String,
    pub code: String,
    pub name: String,
}

/// Short message (`SMS` tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsRecord {
    pub uid: String,
    pub content: String,
    pub tag: String,
    pub min_duration: i64,
    pub start_time: String,
}

/// User/short-message association (`USER_SMS` tag).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSmsRecord {
    pub pin: String,
    pub uid: String,
}

/// Terminal-reported error (`ERRORLOG` tag). Audited, never fanned out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLogRecord {
    pub err_code: String,
    pub err_msg: String,
    pub data_origin: String,
    pub cmd_id: String,
    pub additional: String,
}

/// One parsed upload record, dispatched by wire tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(UserRecord),
    Fingerprint(FingerprintRecord),
    Face(FaceRecord),
    FingerVein(FingerVeinRecord),
    BioData(BioDataRecord),
    UserPic(UserPicRecord),
    BioPhoto(BioPhotoRecord),
    IdCard(IdCardRecord),
    WorkCode(WorkCodeRecord),
    Sms(SmsRecord),
    UserSms(UserSmsRecord),
    ErrorLog(ErrorLogRecord),
}

impl Record {
    /// The wire tag this record arrived under.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::User(_) => "USER",
            Self::Fingerprint(_) => "FP",
            Self::Face(_) => "FACE",
            Self::FingerVein(_) => "FVEIN",
            Self::BioData(_) => "BIODATA",
            Self::UserPic(_) => "USERPIC",
            Self::BioPhoto(_) => "BIOPHOTO",
            Self::IdCard(_) => "IDCARD",
            Self::WorkCode(_) => "WORKCODE",
            Self::Sms(_) => "SMS",
            Self::UserSms(_) => "USER_SMS",
            Self::ErrorLog(_) => "ERRORLOG",
        }
    }

    /// Canonical record key, used for sync-log attribution.
    pub fn key(&self) -> String {
        match self {
            Self::User(u) => u.pin.clone(),
            Self::Fingerprint(fp) => format!("{}:{}", fp.pin, fp.fid),
            Self::Face(f) => format!("{}:{}", f.pin, f.fid),
            Self::FingerVein(fv) => format!("{}:{}", fv.pin, fv.fid),
            Self::BioData(b) => format!("{}:{}:{}", b.pin, b.bio_type, b.no),
            Self::UserPic(p) => p.pin.clone(),
            Self::BioPhoto(p) => format!("{}:{}", p.pin, p.bio_type),
            Self::IdCard(c) => c.id_num.clone(),
            Self::WorkCode(w) => format!("{}:{}", w.pin, w.code),
            Self::Sms(s) => s.uid.clone(),
            Self::UserSms(us) => format!("{}:{}", us.pin, us.uid),
            Self::ErrorLog(e) => e.cmd_id.clone(),
        }
    }

    /// Whether records of this tag are propagated to peer terminals.
    ///
    /// USERPIC and BIOPHOTO are excluded by default (the biometric data is
    /// what keeps the fleet consistent); a configuration switch can opt
    /// photos back in. ERRORLOG is never propagated.
    pub const fn is_syncable(&self) -> bool {
        !matches!(
            self,
            Self::UserPic(_) | Self::BioPhoto(_) | Self::ErrorLog(_)
        )
    }
}

/// Device metadata delivered on poll via the `INFO=` CSV parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware: String,
    pub user_count: Option<i64>,
    pub fp_count: Option<i64>,
    pub transaction_count: Option<i64>,
    pub ip: Option<String>,
    pub fp_algorithm: Option<String>,
    pub face_algorithm: Option<String>,
    pub face_count: Option<i64>,
}

/// A command acknowledgement uploaded on the reply endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub id: String,
    pub return_code: String,
    pub cmd: String,
    /// The full reply line, stored verbatim as the command result.
    pub raw: String,
}

impl CommandReply {
    /// Return code `"0"` means success; anything else is a failure.
    pub fn is_success(&self) -> bool {
        self.return_code == "0"
    }
}
