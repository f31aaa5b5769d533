//! REST OAI-PMH endpoint

use super::PageHandle;
use crate::error::HarnessResult;

/// OAI-PMH error codes that mark a response as invalid
pub const OAI_ERROR_CODES: [&str; 2] = ["idDoesNotExist", "badVerb"];

impl PageHandle<'_> {
    /// The endpoint is available and its XML carries no OAI-PMH error code.
    pub async fn is_valid_oai_pmh_xml(&self) -> HarnessResult<bool> {
        let response = self.ctx.probe.get(&self.url).await?;
        if !self.available_given(&response).await? {
            return Ok(false);
        }
        Ok(!OAI_ERROR_CODES
            .iter()
            .any(|code| response.body.contains(code)))
    }
}
