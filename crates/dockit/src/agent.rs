//! Question answering over the active project

use crate::error::SummarizationError;
use crate::llm::{ChatClient, ChatMessage};
use crate::registry::SourceProject;
use async_trait::async_trait;

/// Answers a question about a project using its detailed index
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn answer(
        &self,
        project: &SourceProject,
        index: &str,
        question: &str,
    ) -> Result<String, SummarizationError>;
}

/// Single chat completion with the detailed index as context
pub struct ChatQueryAgent {
    client: ChatClient,
}

impl ChatQueryAgent {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

/// System instructions for a project's index
pub fn instructions(project: &SourceProject, index: &str) -> String {
    format!(
        "You are a documentation assistant for the project '{}'.\n\
         Answer questions using only the detailed documentation index below. \
         Each entry lists a file path, its original URL and a summary of its contents.\n\
         Identify the most relevant files for the question and cite their paths. \
         If the index does not cover the question, say that the information was not found \
         in the indexed documents. Do not invent information.\n\n\
         DETAILED Documentation Index:\n=============================\n{}",
        project.name, index
    )
}

#[async_trait]
impl QueryAgent for ChatQueryAgent {
    async fn answer(
        &self,
        project: &SourceProject,
        index: &str,
        question: &str,
    ) -> Result<String, SummarizationError> {
        let messages = [
            ChatMessage::system(instructions(project, index)),
            ChatMessage::user(question),
        ];
        self.client.complete(&messages, 0.2).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project() -> SourceProject {
        SourceProject {
            id: "https://x.dev/llms.txt".to_string(),
            name: "XDocs".to_string(),
            cache_dir: PathBuf::from("/tmp/XDocs"),
            content_hash: None,
            documents: 1,
        }
    }

    #[test]
    fn test_instructions_embed_index() {
        let text = instructions(&project(), "## File: `a.md`");
        assert!(text.contains("'XDocs'"));
        assert!(text.ends_with("## File: `a.md`"));
    }

    #[tokio::test]
    async fn test_answer_sends_index_and_question() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("How do I log in?"))
            .and(body_string_contains("## File: `auth.md`"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "See auth.md"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let agent = ChatQueryAgent::new(ChatClient::new(server.uri(), "sk-test", "m").unwrap());
        let answer = agent
            .answer(&project(), "## File: `auth.md`", "How do I log in?")
            .await
            .unwrap();
        assert_eq!(answer, "See auth.md");
    }
}
