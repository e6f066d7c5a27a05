use async_trait::async_trait;
use sa_token_core::SaTokenListener;
use tracing::info;

/// 记录会话事件
pub struct SessionListener;

#[async_trait]
impl SaTokenListener for SessionListener {
    async fn on_login(&self, login_id: &str, _token: &str, login_type: &str) {
        info!(login_id, login_type, "会话已建立");
    }

    async fn on_logout(&self, login_id: &str, _token: &str, login_type: &str) {
        info!(login_id, login_type, "会话已注销");
    }

    async fn on_kick_out(&self, login_id: &str, _token: &str, login_type: &str) {
        info!(login_id, login_type, "会话被强制下线");
    }
}
