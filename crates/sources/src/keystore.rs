//! Parsers for `keytool -list -v` and `gsk8capicmd -cert` output.

use portall_core::{CertificateKind, RawCertificate};

/// Parse `keytool -list -v` output into one raw certificate per alias.
///
/// Only the leaf (first) certificate of each chain is reported.
pub fn parse_keytool_list(output: &str) -> Vec<RawCertificate> {
    let store_type = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Keystore type:"))
        .map(|t| t.trim().to_string());

    let mut certificates = Vec::new();
    let mut current: Option<RawCertificate> = None;
    let mut in_leaf = true;
    let mut in_fingerprints = false;

    for line in output.lines() {
        let trimmed = line.trim();

        if let Some(alias) = trimmed.strip_prefix("Alias name:") {
            certificates.extend(current.take());
            current = Some(RawCertificate {
                kind: CertificateKind::Java,
                alias: Some(alias.trim().to_string()),
                keystore_type: store_type.clone(),
                ..Default::default()
            });
            in_leaf = true;
            in_fingerprints = false;
            continue;
        }

        let Some(cert) = current.as_mut() else {
            continue;
        };

        if let Some(index) = trimmed
            .strip_prefix("Certificate[")
            .and_then(|rest| rest.split(']').next())
        {
            in_leaf = index == "1";
            in_fingerprints = false;
            continue;
        }
        if !in_leaf {
            continue;
        }

        if trimmed == "Certificate fingerprints:" {
            in_fingerprints = true;
            continue;
        }
        if in_fingerprints {
            if let Some(fp) = trimmed.strip_prefix("SHA256:") {
                cert.fingerprint_sha256 = Some(fp.trim().to_string());
                continue;
            }
            if trimmed.starts_with("SHA1:") || trimmed.starts_with("MD5:") {
                continue;
            }
            in_fingerprints = false;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Owner" => set_once(&mut cert.subject, value),
            "Issuer" => set_once(&mut cert.issuer, value),
            "Serial number" => set_once(&mut cert.serial_number, value),
            "Signature algorithm name" => set_once(&mut cert.signature_algorithm, value),
            "Valid from" => {
                if let Some((from, until)) = value.split_once("until:") {
                    set_once(&mut cert.valid_from, from.trim());
                    set_once(&mut cert.valid_to, until.trim());
                }
            }
            _ => {}
        }
    }
    certificates.extend(current);
    certificates
}

/// Parse `gsk8capicmd -cert -list` output into certificate labels.
///
/// Entries are prefixed by marker characters (`*` default, `-` personal,
/// `!` trusted, `#` secret key) and a tab.
pub fn parse_gsk_labels(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let marker_end = line.find(|c: char| !matches!(c, '*' | '-' | '!' | '#'))?;
            if marker_end == 0 || !line[marker_end..].starts_with('\t') {
                return None;
            }
            let label = line[marker_end..].trim();
            (!label.is_empty()).then(|| label.to_string())
        })
        .collect()
}

/// Parse `gsk8capicmd -cert -details` output for one label.
pub fn parse_gsk_details(output: &str) -> RawCertificate {
    let mut cert = RawCertificate {
        kind: CertificateKind::Kdb,
        keystore_type: Some("KDB".to_string()),
        ..Default::default()
    };
    let mut fingerprint_next = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if fingerprint_next {
            fingerprint_next = false;
            if !trimmed.is_empty() && !trimmed.contains(" : ") {
                set_once(&mut cert.fingerprint_sha256, trimmed);
                continue;
            }
        }
        let Some((key, value)) = trimmed.split_once(" : ") else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Label" => set_once(&mut cert.alias, value),
            "Serial" | "Serial Number" => set_once(&mut cert.serial_number, value),
            "Issuer" => set_once(&mut cert.issuer, value),
            "Subject" => set_once(&mut cert.subject, value),
            "Not Before" => set_once(&mut cert.valid_from, value),
            "Not After" => set_once(&mut cert.valid_to, value),
            "Signature Algorithm" => {
                let name = value.split(" (").next().unwrap_or(value);
                set_once(&mut cert.signature_algorithm, name);
            }
            "Fingerprint" => {
                // "Fingerprint : SHA256 : AB:CD..." or the digest on the next line.
                match value.split_once(" : ") {
                    Some((algo, digest)) if algo.trim().eq_ignore_ascii_case("SHA256") => {
                        set_once(&mut cert.fingerprint_sha256, digest.trim());
                    }
                    _ if value.eq_ignore_ascii_case("SHA256") => fingerprint_next = true,
                    _ => {}
                }
            }
            _ => {}
        }
    }
    cert
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}
