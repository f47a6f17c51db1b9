/// One unit of render work as it travels the queue.
///
/// `host_prefix` is captured at submission time so the finished artifact URL
/// points back at whatever host the client reached us on.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub task_id: String,
    pub url: String,
    pub host_prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_carries_submission_context() {
        let job = RenderJob {
            task_id: "t-1".into(),
            url: "https://example.com".into(),
            host_prefix: "http://localhost:8080/".into(),
        };
        assert_eq!(job.task_id, "t-1");
        assert!(job.host_prefix.ends_with('/'));
    }
}
