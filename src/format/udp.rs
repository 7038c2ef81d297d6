use crate::error::{Result, UdpHlsError};
use log::{info, trace};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::UdpSocket;
use url::Url;

const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Resolves a feed address given as `udp://host:port` or `host:port`.
pub async fn resolve_address(address: &str) -> Result<SocketAddr> {
    let host_port = if address.contains("://") {
        let url = Url::parse(address)
            .map_err(|e| UdpHlsError::Config(format!("invalid feed address {}: {}", address, e)))?;
        if url.scheme() != "udp" {
            return Err(UdpHlsError::Config(format!(
                "unsupported scheme {} in feed address {}",
                url.scheme(),
                address
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| UdpHlsError::Config(format!("missing host in {}", address)))?;
        let port = url
            .port()
            .ok_or_else(|| UdpHlsError::Config(format!("missing port in {}", address)))?;
        format!("{}:{}", host, port)
    } else {
        address.to_string()
    };

    let resolved = tokio::net::lookup_host(&host_port)
        .await
        .map_err(|source| UdpHlsError::Bind {
            address: address.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| UdpHlsError::Config(format!("feed address {} did not resolve", address)));
    resolved
}

/// Datagrams of one UDP socket exposed as an ordered byte stream.
///
/// Datagram boundaries are not preserved; empty datagrams are skipped.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
    address: String,
    datagram: Box<[u8]>,
    pos: usize,
    len: usize,
}

impl UdpSource {
    /// Binds the socket for `address`, joining the group for IPv4 multicast.
    pub async fn bind(address: &str) -> Result<Self> {
        let target = resolve_address(address).await?;
        let bind_error = |source: io::Error| UdpHlsError::Bind {
            address: address.to_string(),
            source,
        };

        let socket = match target {
            SocketAddr::V4(v4) if v4.ip().is_multicast() => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, v4.port()))
                    .await
                    .map_err(bind_error)?;
                socket
                    .join_multicast_v4(*v4.ip(), Ipv4Addr::UNSPECIFIED)
                    .map_err(bind_error)?;
                info!("joined multicast group {} for {}", v4.ip(), address);
                socket
            }
            _ => UdpSocket::bind(target).await.map_err(bind_error)?,
        };

        info!("listening for MPEG-TS on udp://{}", socket.local_addr()?);
        Ok(Self {
            socket,
            address: address.to_string(),
            datagram: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl AsyncRead for UdpSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.len {
                let n = (this.len - this.pos).min(buf.remaining());
                buf.put_slice(&this.datagram[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }

            let mut datagram = ReadBuf::new(&mut this.datagram);
            ready!(this.socket.poll_recv(cx, &mut datagram))?;
            let n = datagram.filled().len();
            if n == 0 {
                trace!("skipping empty datagram on {}", this.address);
                continue;
            }
            this.pos = 0;
            this.len = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_datagrams_become_byte_stream() {
        let mut source = UdpSource::bind("127.0.0.1:0").await.unwrap();
        let target = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1, 2, 3], target).await.unwrap();
        sender.send_to(&[], target).await.unwrap();
        sender.send_to(&[4, 5], target).await.unwrap();

        let mut buf = [0u8; 5];
        source.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_resolve_udp_url() {
        let addr = resolve_address("udp://127.0.0.1:9000").await.unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse().unwrap());

        let addr = resolve_address("127.0.0.1:9001").await.unwrap();
        assert_eq!(addr.port(), 9001);
    }

    #[tokio::test]
    async fn test_rejects_other_schemes() {
        assert!(matches!(
            resolve_address("rtp://127.0.0.1:9000").await,
            Err(UdpHlsError::Config(_))
        ));
        assert!(resolve_address("udp://127.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn test_bind_conflict_names_address() {
        let first = UdpSource::bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();

        match UdpSource::bind(&taken).await {
            Err(UdpHlsError::Bind { address, .. }) => assert_eq!(address, taken),
            other => panic!("expected bind error, got {:?}", other.map(|s| s.local_addr())),
        }
    }
}
