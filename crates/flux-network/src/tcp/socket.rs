use std::os::fd::AsRawFd;

/// Set kernel SO_SNDBUF and SO_RCVBUF on a mio TcpStream.
pub(crate) fn set_socket_buf_size(stream: &mio::net::TcpStream, size: usize) {
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            std::ptr::from_ref(&size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            std::ptr::from_ref(&size).cast(),
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Arms SO_LINGER with a zero timeout so the next close sends a TCP RST
/// instead of going through the normal FIN handshake.
pub(crate) fn set_abortive_linger(stream: &mio::net::TcpStream) {
    let fd = stream.as_raw_fd();
    let linger = libc::linger { l_onoff: 1, l_linger: 0 };
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            std::ptr::from_ref(&linger).cast(),
            core::mem::size_of::<libc::linger>() as libc::socklen_t,
        );
    }
}

/// Abortive close: arms SO_LINGER=0 then shuts the socket down, producing a
/// TCP RST on the wire rather than a graceful FIN.
pub(crate) fn abortive_close(stream: &mio::net::TcpStream) {
    set_abortive_linger(stream);
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
