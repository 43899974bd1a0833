//! libcurl-backed range GETs.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::RangeTransport;
use crate::config::CurlConfig;
use crate::planner::ByteRange;
use crate::retry::FetchError;

/// One `curl::easy::Easy` handle per fetch, configured from `CurlConfig`.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    cfg: CurlConfig,
}

impl CurlTransport {
    pub fn new(cfg: CurlConfig) -> Self {
        Self { cfg }
    }

    fn configure(&self, easy: &mut curl::easy::Easy, url: &str, range: ByteRange) -> Result<(), curl::Error> {
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.connect_timeout(Duration::from_secs(self.cfg.connect_timeout_secs))?;
        // Low-speed abort rather than a tight wall clock, so large chunks on slow links survive.
        easy.low_speed_limit(self.cfg.low_speed_limit)?;
        easy.low_speed_time(Duration::from_secs(self.cfg.low_speed_time_secs))?;
        easy.timeout(Duration::from_secs(self.cfg.timeout_secs))?;
        easy.range(&range.curl_range())?;
        easy.progress(true)?;
        Ok(())
    }
}

impl RangeTransport for CurlTransport {
    fn fetch_range(
        &self,
        url: &str,
        range: ByteRange,
        sink: &mut dyn Write,
        abort: &AtomicBool,
    ) -> Result<u64, FetchError> {
        let expected = range.len();
        let mut easy = curl::easy::Easy::new();
        self.configure(&mut easy, url, range).map_err(FetchError::Curl)?;

        let mut received = 0u64;
        let mut overflow = false;
        let mut aborted = false;
        let mut sink_error: Option<io::Error> = None;

        let perform_result = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    if abort.load(Ordering::Relaxed) {
                        aborted = true;
                        return Ok(0);
                    }
                    let len = data.len() as u64;
                    if received + len > expected {
                        // Server ignored the Range header or sent trailing bytes.
                        overflow = true;
                        received += len;
                        return Ok(0);
                    }
                    if let Err(e) = sink.write_all(data) {
                        sink_error = Some(e);
                        return Ok(0);
                    }
                    received += len;
                    Ok(data.len())
                })
                .map_err(FetchError::Curl)?;
            transfer
                .progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))
                .map_err(FetchError::Curl)?;
            transfer.perform()
        };

        if aborted || abort.load(Ordering::Relaxed) {
            return Err(FetchError::Aborted);
        }
        if let Some(e) = sink_error {
            return Err(FetchError::Scratch(e));
        }
        if overflow {
            return Err(FetchError::PartialTransfer { expected, received });
        }
        perform_result.map_err(FetchError::Curl)?;

        let code = easy.response_code().map_err(FetchError::Curl)?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }
        if received != expected {
            return Err(FetchError::PartialTransfer { expected, received });
        }
        Ok(received)
    }
}
