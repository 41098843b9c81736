use async_trait::async_trait;

/// Retrieval-augmented context collaborator: query text in, zero or more
/// supplementary snippets out. A pure function of the query at this
/// boundary; relevance thresholds are the collaborator's business.
#[async_trait]
pub trait Retrieval: Send + Sync {
    async fn search(&self, query: &str) -> Vec<String>;
}

/// Retrieval disabled: every query returns nothing.
pub struct NoRetrieval;

#[async_trait]
impl Retrieval for NoRetrieval {
    async fn search(&self, _query: &str) -> Vec<String> {
        Vec::new()
    }
}
