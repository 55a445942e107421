use crate::error::{PadError, Result};
use std::net::Ipv4Addr;
use tokio::net::UdpSocket;
use tracing::debug;

const WOL_PORT: u16 = 9;

/// Parse `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
///
/// # Errors
/// Returns `PadError::ActionExecution` for anything else.
pub fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    let malformed = || PadError::action("wake_on_lan", format!("malformed MAC address '{mac}'"));

    let parts: Vec<&str> = mac.trim().split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(malformed());
    }
    let mut bytes = [0u8; 6];
    for (byte, part) in bytes.iter_mut().zip(&parts) {
        if part.len() != 2 {
            return Err(malformed());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| malformed())?;
    }
    Ok(bytes)
}

/// Six 0xFF bytes followed by the MAC repeated sixteen times.
pub fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFF; 102];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    packet
}

/// Broadcast a magic packet for `mac`.
///
/// # Errors
/// Returns `PadError::ActionExecution` on a bad address, `PadError::Io` on
/// socket errors.
pub async fn wake(mac: &str, broadcast: &str) -> Result<()> {
    let target: Ipv4Addr = broadcast
        .parse()
        .map_err(|_| PadError::action("wake_on_lan", format!("invalid broadcast address '{broadcast}'")))?;
    let packet = magic_packet(parse_mac(mac)?);

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(&packet, (target, WOL_PORT)).await?;
    debug!("sent magic packet for {mac} to {target}:{WOL_PORT}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_separators() {
        let expected = [0x00, 0x11, 0x22, 0xAA, 0xBB, 0xCC];
        assert_eq!(parse_mac("00:11:22:aa:bb:cc").unwrap(), expected);
        assert_eq!(parse_mac("00-11-22-AA-BB-CC").unwrap(), expected);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "00:11:22:33:44", "00:11:22:33:44:55:66", "0:11:22:33:44:55", "zz:11:22:33:44:55"] {
            assert!(parse_mac(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn packet_layout() {
        let mac = [1, 2, 3, 4, 5, 6];
        let packet = magic_packet(mac);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        assert_eq!(&packet[6..12], &mac);
        assert_eq!(&packet[96..], &mac);
    }
}
