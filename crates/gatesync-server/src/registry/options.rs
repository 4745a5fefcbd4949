//! Init response options block.
//!
//! Terminals configure themselves from this block and reject registration
//! when expected keys are missing, so the key set and its order are part
//! of the wire contract.

use std::fmt::Write;

use crate::storage::Terminal;

/// Multi-biometric capability bitmask used when a terminal has not
/// reported its own: fingerprint, face, palm and both face families on,
/// everything else off.
pub const DEFAULT_MULTI_BIO_MASK: &str = "0:1:1:0:0:0:0:1:1:1";

const PUSH_OPTIONS: &str =
    "FingerFunOn,FaceFunOn,MultiBioDataSupport,MultiBioPhotoSupport,BioPhotoFun,BioDataFun,VisilightFun";

const TRANS_FLAG: &str =
    "TransData EnrollUser ChgUser EnrollFP ChgFP FACE UserPic BioPhoto WORKCODE FVEIN";

/// Render the full init response for a terminal: the `GET OPTION FROM`
/// header plus one `KEY=VALUE` per line, LF terminated.
pub fn render_options_block(terminal: &Terminal) -> String {
    let stamp = |value: &Option<String>| -> String {
        value.clone().unwrap_or_else(|| "None".to_string())
    };
    let mask = |name: &str| -> String {
        terminal
            .option(name)
            .unwrap_or_else(|| DEFAULT_MULTI_BIO_MASK.to_string())
    };
    let time_zone = terminal.option("TimeZone").unwrap_or_else(|| "0".to_string());

    let mut block = String::new();
    let _ = writeln!(block, "GET OPTION FROM: {}", terminal.serial);
    let _ = writeln!(block, "ATTLOGStamp=None");
    let _ = writeln!(block, "OPERLOGStamp={}", stamp(&terminal.operlog_stamp));
    let _ = writeln!(block, "ATTPHOTOStamp=None");
    let _ = writeln!(block, "BIODATAStamp={}", stamp(&terminal.biodata_stamp));
    let _ = writeln!(block, "IDCARDStamp={}", stamp(&terminal.idcard_stamp));
    let _ = writeln!(block, "ERRORLOGStamp={}", stamp(&terminal.errorlog_stamp));
    let _ = writeln!(block, "ErrorDelay=30");
    let _ = writeln!(block, "Delay=10");
    let _ = writeln!(block, "TransTimes=00:00;12:00");
    let _ = writeln!(block, "TransInterval=1");
    let _ = writeln!(block, "TransFlag={TRANS_FLAG}");
    let _ = writeln!(block, "TimeZone={time_zone}");
    let _ = writeln!(block, "Realtime=1");
    let _ = writeln!(block, "Encrypt=None");
    let _ = writeln!(block, "ServerVer={}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(block, "PushProtVer={}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(block, "PushOptionsFlag=1");
    let _ = writeln!(block, "PushOptions={PUSH_OPTIONS}");
    let _ = writeln!(block, "MultiBioDataSupport={}", mask("MultiBioDataSupport"));
    let _ = writeln!(block, "MultiBioPhotoSupport={}", mask("MultiBioPhotoSupport"));
    let _ = writeln!(block, "ATTPHOTOBase64=1");
    block
}
