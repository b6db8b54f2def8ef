use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::LarkClient;
use crate::error::Result;

/// A group conversation the bot is a member of.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub chat_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub owner_open_id: Option<String>,
    #[serde(default)]
    pub owner_user_id: Option<String>,
}

/// One page of the chat list, with the cursor for the next page.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPage {
    #[serde(default)]
    pub groups: Vec<Chat>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
}

/// Identifiers resolved from an email address.
#[derive(Debug, Clone, Deserialize)]
pub struct UserIds {
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl LarkClient {
    /// Fetches one page of the chats the bot belongs to. The page token is
    /// omitted from the request body on the first page.
    pub async fn list_chats_page(&self, page_token: Option<&str>) -> Result<ChatPage> {
        #[derive(Serialize)]
        struct ListRequest<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            page_token: Option<&'a str>,
        }

        let token = self.require_token().await?;
        let page: ChatPage = self
            .post_api(&token, "/chat/v4/list", &ListRequest { page_token })
            .await?;

        debug!(
            groups = page.groups.len(),
            has_more = page.has_more,
            "fetched chat list page"
        );
        Ok(page)
    }

    /// Follows the page cursor until the server reports no more pages,
    /// concatenating results in page order.
    ///
    /// There is no iteration bound: a server that never clears `has_more`
    /// keeps this looping.
    pub async fn list_all_chats(&self) -> Result<Vec<Chat>> {
        let mut chats = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_chats_page(page_token.as_deref()).await?;
            chats.extend(page.groups);
            if !page.has_more {
                break;
            }
            page_token = page.page_token;
        }

        Ok(chats)
    }

    /// Resolves an email address to the user's platform identifiers.
    pub async fn user_id_by_email(&self, email: &str) -> Result<UserIds> {
        #[derive(Serialize)]
        struct EmailRequest<'a> {
            email: &'a str,
        }

        let token = self.require_token().await?;
        self.post_api(&token, "/user/v4/email2id", &EmailRequest { email })
            .await
    }
}
