//! Socket-pair channel between parent and isolated child
//!
//! Each direction carries exactly one message, terminated by shutting down
//! the sender's write half (or by the sender exiting).

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

/// Create a connected (parent end, child end) pair
pub(crate) fn pair() -> io::Result<(UnixStream, UnixStream)> {
    UnixStream::pair()
}

/// Send one message and signal its end
pub(crate) fn send(stream: &mut UnixStream, payload: &[u8]) -> io::Result<()> {
    stream.write_all(payload)?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)
}

/// Read one message, blocking until the peer ends it or goes away
pub(crate) fn receive(stream: &mut UnixStream) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    stream.read_to_end(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn messages_flow_both_ways() {
        let (mut parent, mut child) = pair().unwrap();

        let peer = thread::spawn(move || {
            let request = receive(&mut child).unwrap();
            let mut reply = b"echo:".to_vec();
            reply.extend_from_slice(&request);
            send(&mut child, &reply).unwrap();
        });

        send(&mut parent, b"ping").unwrap();
        assert_eq!(receive(&mut parent).unwrap(), b"echo:ping");
        peer.join().unwrap();
    }

    #[test]
    fn closed_peer_yields_empty_message() {
        let (mut parent, child) = pair().unwrap();
        drop(child);
        assert!(receive(&mut parent).unwrap().is_empty());
    }
}
