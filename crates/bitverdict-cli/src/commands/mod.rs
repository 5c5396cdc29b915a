pub mod battery;
pub mod list;
pub mod run;

use std::fs::File;
use std::io::{self, BufReader, Read};

use bitverdict_tests::{AnyEngine, TestContext, TestError, TestResult};

/// Where the bytes under test come from.
#[derive(Debug, Clone, Copy)]
pub enum InputSpec<'a> {
    Stdin,
    File(&'a str),
    OsRandom(u64),
}

impl<'a> InputSpec<'a> {
    pub fn new(input: Option<&'a str>, os_random: Option<u64>) -> Self {
        match (input, os_random) {
            (_, Some(bytes)) => Self::OsRandom(bytes),
            (Some("-") | None, None) => Self::Stdin,
            (Some(path), None) => Self::File(path),
        }
    }

    pub fn open(self) -> io::Result<Box<dyn Read>> {
        Ok(match self {
            Self::Stdin => Box::new(io::stdin().lock()),
            Self::File(path) => Box::new(BufReader::new(File::open(path)?)),
            Self::OsRandom(bytes) => Box::new(OsRandom { remaining: bytes }),
        })
    }

    pub fn label(self) -> String {
        match self {
            Self::Stdin => "stdin".to_string(),
            Self::File(path) => path.to_string(),
            Self::OsRandom(bytes) => format!("{bytes} OS random bytes"),
        }
    }
}

/// A bounded reader over the OS CSPRNG.
struct OsRandom {
    remaining: u64,
}

impl Read for OsRandom {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        getrandom::fill(&mut buf[..n]).map_err(|e| io::Error::other(format!("OS CSPRNG: {e}")))?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Byte source shared by consecutive trials. Bytes a trial read but did not
/// use are pushed back and served first to the next trial.
pub struct TrialInput<R> {
    reader: R,
    unread: Vec<u8>,
}

impl<R: Read> TrialInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            unread: Vec::new(),
        }
    }

    fn push_back(&mut self, bytes: &[u8]) {
        self.unread.splice(0..0, bytes.iter().copied());
    }
}

impl<R: Read> Read for TrialInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.unread.is_empty() {
            return self.reader.read(buf);
        }
        let n = buf.len().min(self.unread.len());
        buf[..n].copy_from_slice(&self.unread[..n]);
        self.unread.drain(..n);
        Ok(n)
    }
}

/// Fill `buf` as far as the reader allows. Returns 0 only at end of input.
fn read_chunk<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Why a trial produced no verdict.
#[derive(Debug)]
pub enum TrialError {
    Io(io::Error),
    Test(TestError),
}

impl std::fmt::Display for TrialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "read failed: {e}"),
            Self::Test(TestError::InsufficientData { needed, got, unit }) => write!(
                f,
                "input exhausted: need {needed} {unit}, got {got}"
            ),
            Self::Test(e) => write!(f, "{e}"),
        }
    }
}

impl From<io::Error> for TrialError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<TestError> for TrialError {
    fn from(e: TestError) -> Self {
        Self::Test(e)
    }
}

/// Stream chunks into an initialized context until `finalize` commits a
/// verdict or the input runs out.
///
/// Discarded bits always trail the stream, so the whole bytes among them
/// are handed back to `input` for the next trial.
pub fn drive<R: Read>(
    ctx: &mut TestContext<AnyEngine>,
    input: &mut TrialInput<R>,
    buf: &mut [u8],
) -> Result<TestResult, TrialError> {
    loop {
        let n = read_chunk(input, buf)?;
        if n > 0 {
            ctx.update(&buf[..n], n * 8)?;
        }
        match ctx.finalize() {
            Ok(result) => {
                let tail = usize::try_from(result.discarded_bits / 8)
                    .unwrap_or(usize::MAX)
                    .min(n);
                input.push_back(&buf[n - tail..n]);
                return Ok(result.clone());
            }
            Err(e) if e.is_retryable() && n > 0 => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Print errors in the same shape everywhere and exit non-zero.
pub fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(1);
}

pub fn print_result_header() {
    println!(
        "  {:<18} {:>5} {:>10} {:>12} {:>6} {:>9}",
        "Test", "Trial", "p-value", "Statistic", "Grade", "Verdict"
    );
    println!("  {}", "-".repeat(65));
}

pub fn print_result_row(trial: usize, result: &TestResult) {
    println!(
        "  {:<18} {:>5} {:>10.6} {:>12.4} {:>6} {:>9}",
        result.name,
        trial,
        result.p_value,
        result.statistic,
        result.grade,
        result.status.to_string()
    );
    if !result.details.is_empty() {
        println!("  {:<18} {}", "", result.details);
    }
    if result.discarded_bits > 0 {
        println!("  {:<18} discarded {} bits", "", result.discarded_bits);
    }
}
