//! Wire types for the generator endpoint.

use serde::{Deserialize, Serialize};

/// Query string sent with every generation request.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateQuery<'a> {
    pub school: i64,
    pub paper_id: i64,
    pub sec: &'a str,
}

/// Success body. `paper` is the prompt text, `answer` the generated answer.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub paper: String,
    pub answer: String,
}
