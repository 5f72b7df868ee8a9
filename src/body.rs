//! Response body components.
//!
//! A body is a small tree: raw bytes and text at the leaves, eager or lazy
//! sequences as branches, and deferred closures that produce a component
//! only when the body is emitted. [`Body::collect`] flattens the tree into a
//! single buffer exactly once, right before the response goes on the wire.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

/// One component of a response body.
pub enum Body {
    Bytes(Bytes),
    Text(String),
    /// Components emitted in order.
    Seq(Vec<Body>),
    /// Components produced asynchronously, in order.
    Lazy(BoxStream<'static, Body>),
    /// A component built on first emission.
    Deferred(Box<dyn FnOnce() -> Body + Send + 'static>),
}

impl Body {
    pub fn empty() -> Self {
        Self::Bytes(Bytes::new())
    }

    pub fn lazy<S>(stream: S) -> Self
    where
        S: Stream<Item = Body> + Send + 'static,
    {
        Self::Lazy(stream.boxed())
    }

    /// A lazy body from an iterator of components.
    pub fn from_iter_lazy<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Body>,
        I::IntoIter: Send + 'static,
    {
        Self::lazy(stream::iter(iter))
    }

    pub fn deferred(f: impl FnOnce() -> Body + Send + 'static) -> Self {
        Self::Deferred(Box::new(f))
    }

    /// Size in bytes when no lazy or deferred part remains unevaluated.
    pub fn exact_len(&self) -> Option<usize> {
        match self {
            Self::Bytes(b) => Some(b.len()),
            Self::Text(s) => Some(s.len()),
            Self::Seq(parts) => parts.iter().map(Body::exact_len).sum(),
            Self::Lazy(_) | Self::Deferred(_) => None,
        }
    }

    /// Flattens the component tree into one buffer.
    pub async fn collect(self) -> Bytes {
        match self {
            Self::Bytes(b) => b,
            Self::Text(s) => Bytes::from(s),
            other => {
                let mut buf = BytesMut::new();
                other.write_into(&mut buf).await;
                buf.freeze()
            }
        }
    }

    fn write_into(self, buf: &mut BytesMut) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self {
                Self::Bytes(b) => buf.extend_from_slice(&b),
                Self::Text(s) => buf.extend_from_slice(s.as_bytes()),
                Self::Seq(parts) => {
                    for part in parts {
                        part.write_into(buf).await;
                    }
                }
                Self::Lazy(mut stream) => {
                    while let Some(part) = stream.next().await {
                        part.write_into(buf).await;
                    }
                }
                Self::Deferred(f) => f().write_into(buf).await,
            }
        })
    }
}

impl Default for Body {
    fn default() -> Self { Self::empty() }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Self::Seq(parts) => f.debug_tuple("Seq").field(parts).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self { Self::Bytes(b) }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self { Self::Bytes(Bytes::from(v)) }
}

impl From<&'static [u8]> for Body {
    fn from(s: &'static [u8]) -> Self { Self::Bytes(Bytes::from_static(s)) }
}

impl From<String> for Body {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self { Self::Bytes(Bytes::from_static(s.as_bytes())) }
}

impl From<Vec<Body>> for Body {
    fn from(parts: Vec<Body>) -> Self { Self::Seq(parts) }
}
