// Bootstrap channel: the guest sends its predicted notifier FD number to the
// supervisor as a 4-byte little-endian integer over a socket pair.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

pub fn prediction_channel() -> io::Result<(UnixStream, UnixStream)> {
    UnixStream::pair()
}

pub fn send_prediction(sock: &mut UnixStream, fd: i32) -> io::Result<()> {
    sock.write_all(&(fd as u32).to_le_bytes())
}

pub fn recv_prediction(sock: &mut UnixStream) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    sock.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_roundtrip() {
        let (mut a, mut b) = prediction_channel().unwrap();
        send_prediction(&mut a, 5).unwrap();
        assert_eq!(recv_prediction(&mut b).unwrap(), 5);
    }

    #[test]
    fn closed_channel_is_an_error() {
        let (a, mut b) = prediction_channel().unwrap();
        drop(a);
        assert!(recv_prediction(&mut b).is_err());
    }
}
