#![cfg(unix)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use x11qd::backend::HeadlessBackend;
use x11qd::config::ServerConfig;
use x11qd::server::Server;

async fn handshake(path: std::path::PathBuf) -> std::io::Result<Vec<u8>> {
    let mut stream = loop {
        match UnixStream::connect(&path).await {
            Ok(s) => break s,
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    };
    stream.write_all(&[b'l', 0, 11, 0, 0, 0, 0, 0, 0, 0, 0, 0]).await?;
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await?;

    // GetInputFocus round trip
    stream.write_all(&[43, 0, 1, 0]).await?;
    let extra = u16::from_le_bytes([header[6], header[7]]) as usize * 4;
    let mut rest = vec![0u8; extra + 32];
    stream.read_exact(&mut rest).await?;
    let mut out = header.to_vec();
    out.extend_from_slice(&rest);
    Ok(out)
}

#[test_log::test(tokio::test)]
async fn test_client_handshake_over_unix_socket() {
    let dir = std::env::temp_dir().join(format!("x11qd-smoke-{}", std::process::id()));
    let mut config = ServerConfig::headless(64, 48);
    config.display = 77;
    config.unix_dir = dir.clone();
    let server = Server::new(config).unwrap();
    let backend = Box::new(HeadlessBackend::new(64, 48));

    let reply = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::select! {
            biased;
            r = server.run(backend) => panic!("server stopped: {:?}", r),
            reply = handshake(dir.join("X77")) => reply.unwrap(),
        }
    })
    .await
    .unwrap();

    assert_eq!(reply[0], 1, "setup accepted");
    assert_eq!(u16::from_le_bytes([reply[2], reply[3]]), 11);
    let focus = &reply[reply.len() - 32..];
    assert_eq!(focus[0], 1);
    assert_eq!(u16::from_le_bytes([focus[2], focus[3]]), 1);
    // focus starts at PointerRoot
    assert_eq!(u32::from_le_bytes([focus[8], focus[9], focus[10], focus[11]]), 1);
    let _ = std::fs::remove_dir_all(&dir);
}
