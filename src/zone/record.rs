//! Parsed resource records and their canonical text form

use std::fmt;

/// One resource record from a master file
///
/// Owner and any domain-name rdata fields are fully qualified. The type and
/// class are upper-case mnemonics; the rest of the rdata is kept as written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Fully qualified owner name
    pub owner: String,
    /// Time to live in seconds, when one was given or inherited
    pub ttl: Option<u32>,
    /// Class mnemonic (`IN`, `CH`, ...)
    pub class: String,
    /// Type mnemonic (`A`, `MX`, `TYPE65534`, ...)
    pub rtype: String,
    /// Remaining fields
    pub rdata: Vec<String>,
}

/// `owner [ttl] class type rdata...`, single-space separated
impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner)?;
        if let Some(ttl) = self.ttl {
            write!(f, " {}", ttl)?;
        }
        write!(f, " {} {}", self.class, self.rtype)?;
        for field in &self.rdata {
            write!(f, " {}", field)?;
        }
        Ok(())
    }
}

/// Indices of rdata fields that hold domain names for a given type
///
/// Those fields are qualified against the origin like owner names.
pub(crate) fn name_fields(rtype: &str) -> &'static [usize] {
    match rtype {
        "NS" | "CNAME" | "PTR" | "DNAME" | "MB" | "MD" | "MF" | "MG" | "MR" => &[0],
        "MX" | "KX" | "RT" | "AFSDB" => &[1],
        "SOA" | "MINFO" | "RP" => &[0, 1],
        "SRV" => &[3],
        _ => &[],
    }
}
