//! Upload-record parser.
//!
//! Tolerant reader: unknown keys are ignored, missing values come back as
//! empty strings, numeric fields fall back to their protocol defaults.
//! Key names are case-sensitive and differ by tag family (`PIN` vs `Pin`,
//! `Size`/`Valid` vs `SIZE`/`VALID`); the tables here are the only place
//! in the system that knows those spellings.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{
    BioDataRecord, BioPhotoRecord, CommandReply, DeviceInfo, ErrorLogRecord, FaceRecord,
    FingerVeinRecord, FingerprintRecord, IdCardRecord, Record, SmsRecord, UserPicRecord,
    UserRecord, UserSmsRecord, WorkCodeRecord,
};
use crate::error::{Error, Result};

/// `Tmp` captures greedily to end-of-record regardless of the field form:
/// template text must survive byte-for-byte even when the surrounding
/// separators were mangled in transit.
static TMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bTmp=(.*)$").expect("static regex is valid"));

/// Parsed `key=value` fields of one record.
struct Fields<'a> {
    map: HashMap<&'a str, &'a str>,
}

impl<'a> Fields<'a> {
    /// Split on horizontal tabs (the documented upload form).
    fn tab(params: &'a str) -> Self {
        let map = params
            .split('\t')
            .filter_map(|field| field.split_once('='))
            .collect();
        Self { map }
    }

    /// Split on runs of whitespace (BIODATA uploads from firmwares that
    /// drop tabs in transit).
    fn whitespace(params: &'a str) -> Self {
        let map = params
            .split_whitespace()
            .filter_map(|field| field.split_once('='))
            .collect();
        Self { map }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn str(&self, key: &str) -> String {
        self.map.get(key).copied().unwrap_or_default().to_string()
    }

    /// Like [`Fields::str`] but with a default for an entirely absent key.
    /// A key present with a blank value stays blank.
    fn str_or(&self, key: &str, default: &str) -> String {
        self.map
            .get(key)
            .map_or_else(|| default.to_string(), |v| (*v).to_string())
    }

    fn int(&self, key: &str, default: i64) -> i64 {
        self.map
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// Parse a full upload body into records, one entry per non-empty line.
///
/// Lines are LF or CRLF terminated; empty lines are dropped. Failures are
/// returned per line so the ingest pipeline can count accepted records and
/// log the rest.
pub fn parse_payload(body: &str) -> Vec<Result<Record>> {
    body.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(parse_record)
        .collect()
}

/// Parse a single upload record: a short ASCII tag, one space, parameters.
pub fn parse_record(line: &str) -> Result<Record> {
    let (tag, params) = line.split_once(' ').unwrap_or((line, ""));

    match tag {
        "USER" => Ok(parse_user(params)),
        "FP" => Ok(parse_fp(params)),
        "FACE" => Ok(parse_face(params)),
        "FVEIN" => Ok(parse_fvein(params)),
        "BIODATA" => Ok(parse_biodata(params)),
        "USERPIC" => Ok(parse_userpic(params)),
        "BIOPHOTO" => Ok(parse_biophoto(params)),
        "IDCARD" => Ok(parse_idcard(params)),
        "WORKCODE" => Ok(parse_workcode(params)),
        "SMS" => Ok(parse_sms(params)),
        "USER_SMS" => Ok(parse_user_sms(params)),
        "ERRORLOG" => Ok(parse_errorlog(params)),
        other => Err(Error::UnknownTag(other.to_string())),
    }
}

fn parse_user(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::User(UserRecord {
        pin: f.str("PIN"),
        name: f.str("Name"),
        privilege: f.int("Pri", 0),
        password: f.str("Passwd"),
        card: f.str("Card"),
        group: f.str("Grp"),
        time_zone: f.str_or("TZ", "0000000000000000"),
        verify_mode: f.int("Verify", -1),
        vice_card: f.str("ViceCard"),
    })
}

fn parse_fp(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::Fingerprint(FingerprintRecord {
        pin: f.str("PIN"),
        fid: f.int("FID", 0),
        size: f.int("Size", 0),
        valid: f.int("Valid", 1),
        template: f.str("TMP"),
    })
}

fn parse_face(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::Face(FaceRecord {
        pin: f.str("PIN"),
        fid: f.int("FID", 0),
        size: f.int("SIZE", 0),
        valid: f.int("VALID", 1),
        template: f.str("TMP"),
    })
}

fn parse_fvein(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::FingerVein(FingerVeinRecord {
        pin: f.str("Pin"),
        fid: f.int("FID", 0),
        index: f.int("Index", 0),
        size: f.int("Size", 0),
        valid: f.int("Valid", 1),
        template: capture_tmp(params).unwrap_or_else(|| f.str("Tmp")),
    })
}

/// BIODATA uploads arrive tab-separated per the protocol document, but
/// several firmwares collapse tabs to spaces in transit. Tab-parse first;
/// if fewer than 3 keys survive, re-parse on whitespace runs.
fn parse_biodata(params: &str) -> Record {
    let tab = Fields::tab(params);
    let f = if tab.len() < 3 {
        Fields::whitespace(params)
    } else {
        tab
    };

    Record::BioData(BioDataRecord {
        pin: f.str("Pin"),
        no: f.int("No", 0),
        index: f.int("Index", 0),
        valid: f.int("Valid", 1),
        duress: f.int("Duress", 0),
        bio_type: f.int("Type", 0),
        major_ver: f.str_or("MajorVer", "0"),
        minor_ver: f.str_or("MinorVer", "0"),
        format: f.str_or("Format", "0"),
        template: capture_tmp(params).unwrap_or_default(),
    })
}

fn capture_tmp(params: &str) -> Option<String> {
    TMP_RE
        .captures(params)
        .map(|cap| cap[1].trim_end_matches('\t').to_string())
}

fn parse_userpic(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::UserPic(UserPicRecord {
        pin: f.str("PIN"),
        file_name: f.str("FileName"),
        size: f.int("Size", 0),
        content: f.str("Content"),
    })
}

fn parse_biophoto(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::BioPhoto(BioPhotoRecord {
        pin: f.str("PIN"),
        bio_type: f.int("Type", 0),
        file_name: f.str("FileName"),
        size: f.int("Size", 0),
        content: f.str("Content"),
    })
}

fn parse_idcard(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::IdCard(IdCardRecord {
        pin: f.str("PIN"),
        sn_num: f.str("SNNum"),
        id_num: f.str("IDNum"),
        dn_num: f.str("DNNum"),
        name: f.str("Name"),
        gender: f.str("Gender"),
        nation: f.str("Nation"),
        birthday: f.str("Birthday"),
        valid_info: f.str("ValidInfo"),
        address: f.str("Address"),
        additional_info: f.str("AdditionalInfo"),
        issuer: f.str("Issuer"),
        photo: f.str("Photo"),
        fp_template1: f.str("FPTemplate1"),
        fp_template2: f.str("FPTemplate2"),
        reserve: f.str("Reserve"),
        notice: f.str("Notice"),
    })
}

fn parse_workcode(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::WorkCode(WorkCodeRecord {
        pin: f.str("PIN"),
        code: f.str("CODE"),
        name: f.str("NAME"),
    })
}

fn parse_sms(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::Sms(SmsRecord {
        uid: f.str("UID"),
        content: f.str("MSG"),
        tag: f.str("TAG"),
        min_duration: f.int("MIN", 0),
        start_time: f.str("StartTime"),
    })
}

fn parse_user_sms(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::UserSms(UserSmsRecord {
        pin: f.str("PIN"),
        uid: f.str("UID"),
    })
}

fn parse_errorlog(params: &str) -> Record {
    let f = Fields::tab(params);
    Record::ErrorLog(ErrorLogRecord {
        err_code: f.str("ErrCode"),
        err_msg: f.str("ErrMsg"),
        data_origin: f.str("DataOrigin"),
        cmd_id: f.str("CmdId"),
        additional: f.str("Additional"),
    })
}

/// Parse the init request's options string: `key1=value1,key2=value2,...`.
pub fn parse_options_string(options: &str) -> HashMap<String, String> {
    options
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Parse the poll request's `INFO=` CSV parameter.
///
/// Positional: firmware, user count, fingerprint count, transaction count,
/// ip, fingerprint algorithm, face algorithm, face count. Short CSVs from
/// older firmwares just leave the tail unset.
pub fn parse_info_csv(info: &str) -> DeviceInfo {
    let parts: Vec<&str> = info.split(',').map(str::trim).collect();
    let at = |i: usize| parts.get(i).copied().filter(|s| !s.is_empty());

    DeviceInfo {
        firmware: at(0).unwrap_or_default().to_string(),
        user_count: at(1).and_then(|s| s.parse().ok()),
        fp_count: at(2).and_then(|s| s.parse().ok()),
        transaction_count: at(3).and_then(|s| s.parse().ok()),
        ip: at(4).map(String::from),
        fp_algorithm: at(5).map(String::from),
        face_algorithm: at(6).map(String::from),
        face_count: at(7).and_then(|s| s.parse().ok()),
    }
}

/// Parse a reply body: one or more `ID=<cmdid>&Return=<code>&CMD=<tag>`
/// lines. Lines without an `ID` field are dropped.
pub fn parse_reply(body: &str) -> Vec<CommandReply> {
    body.lines()
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
        .filter_map(parse_reply_line)
        .collect()
}

fn parse_reply_line(line: &str) -> Option<CommandReply> {
    let mut id = None;
    let mut return_code = None;
    let mut cmd = String::new();

    for (key, value) in line.split('&').filter_map(|pair| pair.split_once('=')) {
        match key {
            "ID" => id = Some(value.to_string()),
            "Return" => return_code = Some(value.to_string()),
            "CMD" => cmd = value.to_string(),
            _ => {}
        }
    }

    Some(CommandReply {
        id: id?,
        return_code: return_code.unwrap_or_default(),
        cmd,
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_record() {
        let line = "USER PIN=1001\tName=Alice\tPri=14\tPasswd=secret\tCard=123\tGrp=1\tTZ=0000000000000001\tVerify=0\tViceCard=";
        let Record::User(u) = parse_record(line).unwrap() else {
            panic!("expected USER");
        };
        assert_eq!(u.pin, "1001");
        assert_eq!(u.name, "Alice");
        assert_eq!(u.privilege, 14);
        assert_eq!(u.time_zone, "0000000000000001");
        assert_eq!(u.verify_mode, 0);
        assert_eq!(u.vice_card, "");
    }

    #[test]
    fn user_defaults_when_fields_missing() {
        let Record::User(u) = parse_record("USER PIN=7").unwrap() else {
            panic!("expected USER");
        };
        assert_eq!(u.pin, "7");
        assert_eq!(u.time_zone, "0000000000000000");
        assert_eq!(u.verify_mode, -1);
        assert_eq!(u.privilege, 0);
    }

    #[test]
    fn fp_uses_mixed_case_keys() {
        let line = "FP PIN=1001\tFID=3\tSize=512\tValid=1\tTMP=AAAA";
        let Record::Fingerprint(fp) = parse_record(line).unwrap() else {
            panic!("expected FP");
        };
        assert_eq!(fp.pin, "1001");
        assert_eq!(fp.fid, 3);
        assert_eq!(fp.size, 512);
        assert_eq!(fp.valid, 1);
        assert_eq!(fp.template, "AAAA");
    }

    #[test]
    fn face_uses_upper_case_keys() {
        let line = "FACE PIN=2\tFID=0\tSIZE=1024\tVALID=1\tTMP=QkJC";
        let Record::Face(f) = parse_record(line).unwrap() else {
            panic!("expected FACE");
        };
        assert_eq!(f.size, 1024);
        assert_eq!(f.valid, 1);
        assert_eq!(f.template, "QkJC");
    }

    #[test]
    fn fvein_uses_pin_spelling_of_biodata_family() {
        let line = "FVEIN Pin=5\tFID=2\tIndex=1\tSize=900\tValid=1\tTmp=dmVpbg==";
        let Record::FingerVein(fv) = parse_record(line).unwrap() else {
            panic!("expected FVEIN");
        };
        assert_eq!(fv.pin, "5");
        assert_eq!(fv.fid, 2);
        assert_eq!(fv.index, 1);
        assert_eq!(fv.template, "dmVpbg==");
    }

    #[test]
    fn biodata_tab_separated() {
        let line = "BIODATA Pin=1001\tNo=3\tIndex=0\tValid=1\tDuress=0\tType=1\tMajorVer=12\tMinorVer=0\tFormat=ZK\tTmp=AAAA";
        let Record::BioData(b) = parse_record(line).unwrap() else {
            panic!("expected BIODATA");
        };
        assert_eq!(b.pin, "1001");
        assert_eq!(b.no, 3);
        assert_eq!(b.bio_type, 1);
        assert_eq!(b.major_ver, "12");
        assert_eq!(b.format, "ZK");
        assert_eq!(b.template, "AAAA");
    }

    #[test]
    fn biodata_whitespace_fallback() {
        // Tabs collapsed to (multiple) spaces in transit.
        let line = "BIODATA Pin=1001 No=3  Index=0 Valid=1 Duress=0 Type=7 MajorVer=0 MinorVer=0 Format=0 Tmp=dGVtcGxhdGU=";
        let Record::BioData(b) = parse_record(line).unwrap() else {
            panic!("expected BIODATA");
        };
        assert_eq!(b.pin, "1001");
        assert_eq!(b.bio_type, 7);
        assert_eq!(b.format, "0");
        assert_eq!(b.template, "dGVtcGxhdGU=");
    }

    #[test]
    fn biodata_numeric_format_passes_through() {
        let line = "BIODATA Pin=9 No=0 Index=0 Valid=1 Duress=0 Type=2 Format=0 Tmp=Zg==";
        let Record::BioData(b) = parse_record(line).unwrap() else {
            panic!("expected BIODATA");
        };
        assert_eq!(b.format, "0");
        assert_eq!(b.major_ver, "0"); // absent, protocol default
    }

    #[test]
    fn biodata_tmp_is_greedy_to_end() {
        // Template text is never cut, even past a stray space.
        let line = "BIODATA Pin=1 No=0 Index=0 Valid=1 Type=2 Tmp=QUJD REVG";
        let Record::BioData(b) = parse_record(line).unwrap() else {
            panic!("expected BIODATA");
        };
        assert_eq!(b.template, "QUJD REVG");
    }

    #[test]
    fn payload_drops_empty_lines_and_handles_crlf() {
        let body = "USER PIN=1\r\n\r\nUSER PIN=2\n\nUSER PIN=3";
        let records = parse_payload(body);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(Result::is_ok));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let err = parse_record("ATTLOG 1\t2\t3").unwrap_err();
        assert!(matches!(err, Error::UnknownTag(_)));
    }

    #[test]
    fn workcode_and_sms_records() {
        let Record::WorkCode(w) = parse_record("WORKCODE PIN=1\tCODE=55\tNAME=Night").unwrap()
        else {
            panic!("expected WORKCODE");
        };
        assert_eq!(w.code, "55");
        assert_eq!(w.name, "Night");

        let Record::Sms(s) =
            parse_record("SMS MSG=Hello\tTAG=253\tUID=9\tMIN=60\tStartTime=2024-01-01 08:00:00")
                .unwrap()
        else {
            panic!("expected SMS");
        };
        assert_eq!(s.uid, "9");
        assert_eq!(s.content, "Hello");
        assert_eq!(s.min_duration, 60);
    }

    #[test]
    fn errorlog_record() {
        let Record::ErrorLog(e) =
            parse_record("ERRORLOG ErrCode=-10\tErrMsg=PIN not found\tDataOrigin=BIODATA\tCmdId=abc")
                .unwrap()
        else {
            panic!("expected ERRORLOG");
        };
        assert_eq!(e.err_code, "-10");
        assert_eq!(e.data_origin, "BIODATA");
    }

    #[test]
    fn options_string_parses_to_map() {
        let map = parse_options_string("FingerFunOn=1,FaceFunOn=0,MultiBioDataSupport=0:1:1:0:0:0:0:1:1:1");
        assert_eq!(map.get("FingerFunOn").map(String::as_str), Some("1"));
        assert_eq!(
            map.get("MultiBioDataSupport").map(String::as_str),
            Some("0:1:1:0:0:0:0:1:1:1")
        );
    }

    #[test]
    fn info_csv_full_and_short() {
        let info = parse_info_csv("Ver 8.0.4.2,10,25,1000,192.168.1.20,10,7,3");
        assert_eq!(info.firmware, "Ver 8.0.4.2");
        assert_eq!(info.user_count, Some(10));
        assert_eq!(info.ip.as_deref(), Some("192.168.1.20"));
        assert_eq!(info.face_count, Some(3));

        let short = parse_info_csv("Ver 6.60");
        assert_eq!(short.firmware, "Ver 6.60");
        assert_eq!(short.user_count, None);
        assert_eq!(short.ip, None);
    }

    #[test]
    fn reply_lines_parse() {
        let replies = parse_reply("ID=abcd1234abcd1234&Return=0&CMD=DATA\r\nID=x&Return=-1003&CMD=DATA\n");
        assert_eq!(replies.len(), 2);
        assert!(replies[0].is_success());
        assert!(!replies[1].is_success());
        assert_eq!(replies[1].return_code, "-1003");
    }

    #[test]
    fn reply_without_id_is_dropped() {
        assert!(parse_reply("Return=0&CMD=DATA").is_empty());
    }
}
