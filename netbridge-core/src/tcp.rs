//! TCP tuning for coordinator and worker streams.
//!
//! Task and result frames are small and latency-bound (one request, one
//! reply), so Nagle's algorithm is disabled on every connection.
//!
//! # Safety
//!
//! The raw fd/socket is borrowed into a `socket2::Socket` only to set the
//! option, then forgotten so ownership stays with the compio stream.

#![allow(unsafe_code)]

use std::io;

/// Set `TCP_NODELAY` on a compio `TcpStream`.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
#[inline]
pub fn enable_tcp_nodelay(stream: &compio::net::TcpStream) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let sock = unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) };
        let result = sock.set_nodelay(true);
        std::mem::forget(sock);
        result
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let sock = unsafe { socket2::Socket::from_raw_socket(stream.as_raw_socket()) };
        let result = sock.set_nodelay(true);
        std::mem::forget(sock);
        result
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = stream;
        Ok(())
    }
}
