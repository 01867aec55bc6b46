//! Wire protocol between clients and the file storage server.
//!
//! Every message is a frame: a fixed-size header followed by a payload.
//! The header is a bincode-serialized [`FrameHeader`], carrying a 16 bit code and the payload length.
//! For requests, the code is the [`RequestCode`] of the operation and the payload a [`RequestFrame`].
//! For responses, the code is the [`ResponseCode`] status and the payload a [`Payload`].
//!
//! The functions below are generic over tokio's `AsyncRead`/`AsyncWrite`, so the same codec serves UNIX sockets, TCP streams and in-memory pipes in the tests.
//!
//! *EXTRA*: bincode's top level functions use a fixed-width integer encoding, which is what makes the header size independent of the values it carries.

use super::error::ProtocolError;
use super::types::FileCopy;
use lazy_static::lazy_static;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted by the decoder, in bytes
pub const MAX_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Header preceding every payload
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Request code or response status
    pub code: u16,
    /// Length of the payload that follows, in bytes
    pub payload_len: u64,
}

lazy_static! {
    /// Size a serialized `FrameHeader` takes up on the wire, in bytes.
    /// Only known once bincode has serialized a header, hence the `lazy_static`.
    pub static ref FRAME_HEADER_SIZE : usize = bincode::serialize(&FrameHeader::default()).unwrap().len();
}

/// Operations a client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestCode {
    /// Open or create a file
    Open = 0,
    /// Read one file
    Read = 1,
    /// Read several files
    ReadN = 2,
    /// Write the content of an empty file
    Write = 3,
    /// Append to a file
    Append = 4,
    /// Take the exclusive lock
    Lock = 5,
    /// Release the exclusive lock
    Unlock = 6,
    /// Close a file
    Close = 7,
    /// Remove a file
    Remove = 8,
    /// End the connection
    Disconnect = 9,
}

impl RequestCode {
    /// Decode a code received on the wire
    pub fn from_code(code: u16) -> Option<RequestCode> {
        use RequestCode::*;
        [
            Open, Read, ReadN, Write, Append, Lock, Unlock, Close, Remove, Disconnect,
        ]
        .into_iter()
        .find(|c| *c as u16 == code)
    }

    /// Status sent back when the operation succeeds
    pub fn success(self) -> ResponseCode {
        match self {
            RequestCode::Open => ResponseCode::OpenFileSuccess,
            RequestCode::Read => ResponseCode::ReadFileSuccess,
            RequestCode::ReadN => ResponseCode::ReadNFileSuccess,
            RequestCode::Write => ResponseCode::WriteFileSuccess,
            RequestCode::Append => ResponseCode::AppendFileSuccess,
            RequestCode::Lock => ResponseCode::LockFileSuccess,
            RequestCode::Unlock => ResponseCode::UnlockFileSuccess,
            RequestCode::Close => ResponseCode::CloseFileSuccess,
            RequestCode::Remove => ResponseCode::RemoveFileSuccess,
            RequestCode::Disconnect => ResponseCode::CloseConnSuccess,
        }
    }

    /// Short lower case name, used in the operation log
    pub fn name(self) -> &'static str {
        match self {
            RequestCode::Open => "open",
            RequestCode::Read => "read",
            RequestCode::ReadN => "readn",
            RequestCode::Write => "write",
            RequestCode::Append => "append",
            RequestCode::Lock => "lock",
            RequestCode::Unlock => "unlock",
            RequestCode::Close => "close",
            RequestCode::Remove => "remove",
            RequestCode::Disconnect => "disconnect",
        }
    }
}

/// Status of a response.
/// HTTP-like numbering: 2xx success, 4xx client errors, 5xx server errors.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    OpenFileSuccess = 200,
    ReadFileSuccess = 201,
    ReadNFileSuccess = 202,
    WriteFileSuccess = 203,
    AppendFileSuccess = 204,
    LockFileSuccess = 206,
    UnlockFileSuccess = 207,
    CloseFileSuccess = 208,
    RemoveFileSuccess = 209,
    CloseConnSuccess = 210,

    FileAlreadyOpen = 400,
    FileAlreadyClosed = 401,
    FileAlreadyExists = 402,
    FileAlreadyWritten = 403,
    FileNotFound = 404,
    FileNotOpened = 405,
    FileEmpty = 406,
    FileTooBig = 407,
    StorageEmpty = 408,
    InvalidArgument = 409,
    PermissionDenied = 410,
    FileAlreadyUnlocked = 411,

    /// The storage engine failed; the server is shutting down
    InternalError = 500,
    /// The server is shutting down and dropped a waiting request
    ServiceUnavailable = 503,
}

impl ResponseCode {
    const ALL: [ResponseCode; 24] = [
        ResponseCode::OpenFileSuccess,
        ResponseCode::ReadFileSuccess,
        ResponseCode::ReadNFileSuccess,
        ResponseCode::WriteFileSuccess,
        ResponseCode::AppendFileSuccess,
        ResponseCode::LockFileSuccess,
        ResponseCode::UnlockFileSuccess,
        ResponseCode::CloseFileSuccess,
        ResponseCode::RemoveFileSuccess,
        ResponseCode::CloseConnSuccess,
        ResponseCode::FileAlreadyOpen,
        ResponseCode::FileAlreadyClosed,
        ResponseCode::FileAlreadyExists,
        ResponseCode::FileAlreadyWritten,
        ResponseCode::FileNotFound,
        ResponseCode::FileNotOpened,
        ResponseCode::FileEmpty,
        ResponseCode::FileTooBig,
        ResponseCode::StorageEmpty,
        ResponseCode::InvalidArgument,
        ResponseCode::PermissionDenied,
        ResponseCode::FileAlreadyUnlocked,
        ResponseCode::InternalError,
        ResponseCode::ServiceUnavailable,
    ];

    /// Decode a status received on the wire
    pub fn from_code(code: u16) -> Option<ResponseCode> {
        ResponseCode::ALL.into_iter().find(|c| *c as u16 == code)
    }

    /// Whether this status reports a success
    pub fn is_success(self) -> bool {
        (200..300).contains(&(self as u16))
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, *self as u16)
    }
}

/// Body of a request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Open `path` with the raw bits of an `OpenFlags`
    Open {
        /// File to open
        path: String,
        /// Bits of the requested `OpenFlags`
        flags: u8,
    },
    /// Read `path`
    Read {
        /// File the operation applies to
        path: String,
    },
    /// Read up to `n` files; `n <= 0` reads all of them
    ReadN {
        /// Maximum number of files to return
        n: i64,
    },
    /// Write `content` into the empty file `path`
    Write {
        /// File to write
        path: String,
        /// Complete content of the file
        content: Vec<u8>,
    },
    /// Append `data` to `path`
    Append {
        /// File to grow
        path: String,
        /// Bytes added at the end
        data: Vec<u8>,
    },
    /// Lock `path`, waiting until the lock is granted
    Lock {
        /// File the operation applies to
        path: String,
    },
    /// Unlock `path`
    Unlock {
        /// File the operation applies to
        path: String,
    },
    /// Close `path`
    Close {
        /// File the operation applies to
        path: String,
    },
    /// Remove `path`
    Remove {
        /// File the operation applies to
        path: String,
    },
    /// End the connection
    Disconnect,
}

impl Request {
    /// Code sent in the header of this request
    pub fn code(&self) -> RequestCode {
        match self {
            Request::Open { .. } => RequestCode::Open,
            Request::Read { .. } => RequestCode::Read,
            Request::ReadN { .. } => RequestCode::ReadN,
            Request::Write { .. } => RequestCode::Write,
            Request::Append { .. } => RequestCode::Append,
            Request::Lock { .. } => RequestCode::Lock,
            Request::Unlock { .. } => RequestCode::Unlock,
            Request::Close { .. } => RequestCode::Close,
            Request::Remove { .. } => RequestCode::Remove,
            Request::Disconnect => RequestCode::Disconnect,
        }
    }

    /// File the request is about, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Request::Open { path, .. }
            | Request::Read { path }
            | Request::Write { path, .. }
            | Request::Append { path, .. }
            | Request::Lock { path }
            | Request::Unlock { path }
            | Request::Close { path }
            | Request::Remove { path } => Some(path),
            Request::ReadN { .. } | Request::Disconnect => None,
        }
    }
}

/// A request together with the name of the client sending it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Name of the requesting client
    pub client: String,
    /// The requested operation
    pub request: Request,
}

/// Data carried by a response
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Nothing beyond the status
    #[default]
    Empty,
    /// Content of a single file
    Data(Vec<u8>),
    /// Copies of several files, either read or evicted
    Files(Vec<FileCopy>),
    /// Number of bytes released by a removal
    Freed(u64),
}

/// A response: status plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Outcome of the request
    pub status: ResponseCode,
    /// Data returned with it
    pub payload: Payload,
}

impl Response {
    /// Response without payload
    pub fn status(status: ResponseCode) -> Response {
        Response {
            status,
            payload: Payload::Empty,
        }
    }

    /// Response carrying `payload`
    pub fn with_payload(status: ResponseCode, payload: Payload) -> Response {
        Response { status, payload }
    }
}

/// Write one frame: header first, then the serialized `body`
async fn write_frame<W, S>(w: &mut W, code: u16, body: &S) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    S: Serialize,
{
    let payload = bincode::serialize(body)?;
    let header = FrameHeader {
        code,
        payload_len: payload.len() as u64,
    };
    w.write_all(&bincode::serialize(&header)?).await?;
    w.write_all(&payload).await?;
    w.flush().await?;
    Ok(())
}

/// Read one frame and deserialize its payload.
/// Returns `None` if the stream ends cleanly before a new header starts.
async fn read_frame<R, S>(r: &mut R) -> Result<Option<(u16, S)>, ProtocolError>
where
    R: AsyncRead + Unpin,
    S: DeserializeOwned,
{
    let mut header_buf = vec![0u8; *FRAME_HEADER_SIZE];
    let first = r.read(&mut header_buf).await?;
    if first == 0 {
        return Ok(None);
    }
    r.read_exact(&mut header_buf[first..]).await?;
    let header: FrameHeader = bincode::deserialize(&header_buf)?;
    if header.payload_len > MAX_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge(header.payload_len));
    }

    let mut payload = vec![0u8; header.payload_len as usize];
    r.read_exact(&mut payload).await?;
    Ok(Some((header.code, bincode::deserialize(&payload)?)))
}

/// Send a request
pub async fn write_request<W>(w: &mut W, frame: &RequestFrame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(w, frame.request.code() as u16, frame).await
}

/// Receive a request, or `None` if the peer closed the stream
pub async fn read_request<R>(r: &mut R) -> Result<Option<RequestFrame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let (code, frame): (u16, RequestFrame) = match read_frame(r).await? {
        Some(read) => read,
        None => return Ok(None),
    };
    let expected = RequestCode::from_code(code).ok_or(ProtocolError::UnknownCode(code))?;
    if frame.request.code() != expected {
        return Err(ProtocolError::CodeMismatch(code));
    }
    Ok(Some(frame))
}

/// Send a response
pub async fn write_response<W>(w: &mut W, response: &Response) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(w, response.status as u16, &response.payload).await
}

/// Receive a response, or `None` if the peer closed the stream
pub async fn read_response<R>(r: &mut R) -> Result<Option<Response>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let (code, payload): (u16, Payload) = match read_frame(r).await? {
        Some(read) => read,
        None => return Ok(None),
    };
    let status = ResponseCode::from_code(code).ok_or(ProtocolError::UnknownCode(code))?;
    Ok(Some(Response { status, payload }))
}
