//! Operator-facing pairing display.

use qrcode::QrCode;

/// Render a pairing challenge as a terminal-friendly QR block.
///
/// Uses the `qrcode` string renderer with two columns per module so the
/// code stays roughly square in a terminal.
pub fn render_qr(challenge: &str) -> String {
    match QrCode::new(challenge.as_bytes()) {
        Ok(qr) => qr
            .render::<char>()
            .quiet_zone(true)
            .module_dimensions(2, 1)
            .build(),
        Err(_) => String::from("[QR code generation failed]"),
    }
}

/// Print a pairing challenge to stderr for the operator to scan.
pub fn display_challenge(challenge: &str) {
    eprintln!("{}", render_qr(challenge));
    eprintln!("Scan the QR code above with WhatsApp > Linked devices to log in");
}
