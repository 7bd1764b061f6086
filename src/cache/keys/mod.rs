/// 邮箱验证码缓存键前缀，与发送次数计数器的前缀互不重叠
const EMAIL_CODE_PREFIX: &str = "email:register:code:";

/// 会话缓存键前缀
const SESSION_PREFIX: &str = "session:";

/// 记住我 cookie 名与缓存键共用的前缀
pub const REMEMBER_PREFIX: &str = "userLoginCipher";

/// 生成邮箱验证码缓存键
pub fn email_code_key(email: &str) -> String {
    format!("{}{}", EMAIL_CODE_PREFIX, email)
}

/// 生成会话缓存键
pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

/// 生成记住我缓存键，与 cookie 名一致
pub fn remember_key(username: &str) -> String {
    format!("{}{}", REMEMBER_PREFIX, username)
}

/// 生成文章热度缓存键
pub fn heat_key(author: &str, article_id: i64) -> String {
    // 用户名可以以数字结尾，作者与 id 之间需要分隔符
    format!("article{}:{}", author, article_id)
}
