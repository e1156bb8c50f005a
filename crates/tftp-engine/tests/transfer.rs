//! End-to-end transfers against a running engine.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tftp_engine::{
    Client, ErrorCode, Handler, Packet, ReadSource, Rejection, Server, ShutdownHandle,
    TftpError, TransferRequest, WriteSink,
};
use tokio::io::AsyncWrite;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Serves a fixed set of files and records uploads.
#[derive(Clone, Default)]
struct Files {
    files: HashMap<String, Bytes>,
    uploads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Files {
    fn with(mut self, name: &str, data: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), Bytes::from(data));
        self
    }
}

#[async_trait]
impl Handler for Files {
    async fn read(&self, request: &TransferRequest) -> Result<ReadSource, Rejection> {
        self.files
            .get(&request.filename)
            .cloned()
            .map(ReadSource::from_bytes)
            .ok_or_else(|| Rejection::not_found(format!("{} not found", request.filename)))
    }

    async fn write(&self, request: &TransferRequest) -> Result<WriteSink, Rejection> {
        if request.filename.starts_with("readonly/") {
            return Err(Rejection::access_violation("read-only area"));
        }
        Ok(WriteSink::new(Upload {
            name: request.filename.clone(),
            buf: Vec::new(),
            uploads: Arc::clone(&self.uploads),
        }))
    }
}

struct Upload {
    name: String,
    buf: Vec<u8>,
    uploads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl AsyncWrite for Upload {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        _: &mut std::task::Context<'_>,
        data: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        self.buf.extend_from_slice(data);
        std::task::Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        this.uploads
            .lock()
            .unwrap()
            .insert(this.name.clone(), std::mem::take(&mut this.buf));
        std::task::Poll::Ready(Ok(()))
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn start(files: Files, single_port: bool) -> (SocketAddr, ShutdownHandle, JoinHandle<tftp_engine::Result<()>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let server = Server::new(files)
        .timeout(Duration::from_millis(500))
        .retries(3)
        .single_port(single_port);
    let handle = server.shutdown_handle();
    let task = tokio::spawn(async move { server.serve(socket).await });
    (addr, handle, task)
}

fn client(addr: SocketAddr) -> Client {
    Client::new(addr).timeout(Duration::from_millis(500)).retries(3)
}

#[tokio::test]
async fn test_read_small_file() {
    let files = Files::default().with("hello.txt", b"hello\n".to_vec());
    let (addr, handle, task) = start(files, false).await;

    let download = client(addr).get("hello.txt").await.unwrap();
    assert_eq!(&download.data[..], b"hello\n");
    assert!(download.negotiated.is_empty());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_read_multi_block_file() {
    let data = pattern(3000);
    let files = Files::default().with("ipxe.efi", data.clone());
    let (addr, handle, _task) = start(files, false).await;

    let download = client(addr).get("ipxe.efi").await.unwrap();
    assert_eq!(download.data.len(), 3000);
    assert_eq!(&download.data[..], &data[..]);

    handle.shutdown();
}

#[tokio::test]
async fn test_read_exact_multiple_of_block_size() {
    let data = pattern(1024);
    let files = Files::default().with("two-blocks.bin", data.clone());
    let (addr, handle, _task) = start(files, false).await;

    let download = client(addr).get("two-blocks.bin").await.unwrap();
    assert_eq!(&download.data[..], &data[..]);

    handle.shutdown();
}

#[tokio::test]
async fn test_read_empty_file() {
    let files = Files::default().with("empty", Vec::new());
    let (addr, handle, _task) = start(files, false).await;

    let download = client(addr).get("empty").await.unwrap();
    assert!(download.data.is_empty());

    handle.shutdown();
}

#[tokio::test]
async fn test_negotiated_options() {
    let data = pattern(5000);
    let files = Files::default().with("big.bin", data.clone());
    let (addr, handle, _task) = start(files, false).await;

    let download = client(addr)
        .block_size(1428)
        .transfer_size()
        .get("big.bin")
        .await
        .unwrap();
    assert_eq!(download.negotiated.blksize, Some(1428));
    assert_eq!(download.negotiated.tsize, Some(5000));
    assert_eq!(&download.data[..], &data[..]);

    handle.shutdown();
}

#[tokio::test]
async fn test_oack_sent_from_new_port() {
    let files = Files::default().with("a.bin", pattern(10));
    let (addr, handle, _task) = start(files, false).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"\x00\x01a.bin\x00octet\x00tsize\x000\x00", addr)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(from, addr);
    match Packet::parse(&buf[..len]).unwrap() {
        Packet::Oack(options) => assert_eq!(options.tsize, Some(10)),
        other => panic!("expected OACK, got {other:?}"),
    }

    handle.shutdown();
}

#[tokio::test]
async fn test_undersized_block_size_is_not_acknowledged() {
    let files = Files::default().with("a.bin", pattern(600));
    let (addr, handle, _task) = start(files, false).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"\x00\x01a.bin\x00octet\x00blksize\x004\x00", addr)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    match Packet::parse(&buf[..len]).unwrap() {
        Packet::Data { block, data } => {
            assert_eq!(block, 1);
            assert_eq!(data.len(), 512);
        }
        other => panic!("expected DATA at the default block size, got {other:?}"),
    }

    handle.shutdown();
}

#[tokio::test]
async fn test_read_missing_file() {
    let (addr, handle, _task) = start(Files::default(), false).await;

    let err = client(addr).get("missing.bin").await.unwrap_err();
    match err {
        TftpError::Remote { code, message } => {
            assert_eq!(code, ErrorCode::FileNotFound);
            assert!(message.contains("missing.bin"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    handle.shutdown();
}

#[tokio::test]
async fn test_write_accepted() {
    let files = Files::default();
    let uploads = Arc::clone(&files.uploads);
    let (addr, handle, _task) = start(files, false).await;

    let data = pattern(1500);
    client(addr)
        .put("upload.bin", Bytes::from(data.clone()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(uploads.lock().unwrap().get("upload.bin"), Some(&data));

    handle.shutdown();
}

#[tokio::test]
async fn test_write_rejected() {
    let (addr, handle, _task) = start(Files::default(), false).await;

    let err = client(addr)
        .put("readonly/x", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TftpError::Remote {
            code: ErrorCode::AccessViolation,
            ..
        }
    ));

    handle.shutdown();
}

#[tokio::test]
async fn test_single_port_read() {
    let data = pattern(2600);
    let files = Files::default().with("ipxe.efi", data.clone());
    let (addr, handle, task) = start(files, true).await;

    let (first, second) = (client(addr), client(addr));
    let (a, b) = tokio::join!(first.get("ipxe.efi"), second.get("ipxe.efi"));
    assert_eq!(&a.unwrap().data[..], &data[..]);
    assert_eq!(&b.unwrap().data[..], &data[..]);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_single_port_replies_from_listening_port() {
    let files = Files::default().with("a.bin", pattern(10));
    let (addr, handle, _task) = start(files, true).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"\x00\x01a.bin\x00octet\x00", addr)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, addr);
    assert!(matches!(
        Packet::parse(&buf[..len]).unwrap(),
        Packet::Data { block: 1, .. }
    ));

    handle.shutdown();
}

#[tokio::test]
async fn test_shutdown_releases_socket() {
    let (addr, handle, task) = start(Files::default(), false).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    UdpSocket::bind(addr).await.unwrap();
}
