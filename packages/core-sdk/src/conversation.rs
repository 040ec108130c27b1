use crate::models::Message;

/** \brief 保留的对话轮数（不含 system）。 */
pub const MAX_EXCHANGE_TURNS: usize = 10;

/**
 * \brief 会话历史：首条固定为 system，其后最多保留最近 10 条消息。
 */
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Message::system(system_prompt)],
        }
    }

    /**
     * \brief 依次追加用户消息与助手回复，然后从最旧的非 system 消息开始裁剪。
     */
    pub fn append_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(Message::user(user));
        self.turns.push(Message::assistant(assistant));
        self.truncate();
    }

    fn truncate(&mut self) {
        let limit = MAX_EXCHANGE_TURNS + 1;
        if self.turns.len() > limit {
            let excess = self.turns.len() - limit;
            self.turns.drain(1..1 + excess);
        }
    }

    /** \brief 完整历史（含 system），用于请求负载。 */
    pub fn snapshot(&self) -> &[Message] {
        &self.turns
    }

    /**
     * \brief 历史加上一条待发送的用户消息，不修改自身。
     */
    pub fn with_user_turn(&self, user: &str) -> Vec<Message> {
        let mut out = self.turns.clone();
        out.push(Message::user(user));
        out
    }

    /** \brief 展示用记录，不含 system。 */
    pub fn transcript(&self) -> &[Message] {
        &self.turns[1..]
    }

    pub fn system_prompt(&self) -> &str {
        &self.turns[0].content
    }

    /** \brief 消息总数，包含 system。 */
    pub fn message_count(&self) -> usize {
        self.turns.len()
    }

    /** \brief 尚未有任何用户与助手的往来。 */
    pub fn has_no_exchanges(&self) -> bool {
        self.transcript().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_new_has_only_system_turn() {
        let conv = Conversation::new("sys");
        assert_eq!(conv.message_count(), 1);
        assert!(conv.has_no_exchanges());
        assert!(conv.transcript().is_empty());
        assert_eq!(conv.snapshot()[0], Message::system("sys"));
    }

    #[test]
    fn test_append_exchange_adds_user_then_assistant() {
        let mut conv = Conversation::new("sys");
        conv.append_exchange("oi", "olá!");
        assert_eq!(conv.message_count(), 3);
        assert!(!conv.has_no_exchanges());
        assert_eq!(conv.snapshot()[1], Message::user("oi"));
        assert_eq!(conv.snapshot()[2], Message::assistant("olá!"));
        assert_eq!(conv.transcript().len(), 2);
    }

    #[test]
    fn test_truncation_keeps_system_and_latest_turns() {
        let mut conv = Conversation::new("sys");
        for i in 0..8 {
            conv.append_exchange(format!("u{i}"), format!("a{i}"));
        }
        assert_eq!(conv.message_count(), 11);
        assert_eq!(conv.snapshot()[0], Message::system("sys"));
        // 8 轮共 16 条，保留最后 10 条：u3..a7
        assert_eq!(conv.snapshot()[1], Message::user("u3"));
        assert_eq!(conv.snapshot()[10], Message::assistant("a7"));
        let roles: Vec<Role> = conv.transcript().iter().map(|m| m.role).collect();
        assert!(roles
            .chunks(2)
            .all(|pair| pair == [Role::User, Role::Assistant]));
    }

    #[test]
    fn test_with_user_turn_does_not_mutate() {
        let mut conv = Conversation::new("sys");
        conv.append_exchange("a", "b");
        let pending = conv.with_user_turn("next");
        assert_eq!(pending.len(), 4);
        assert_eq!(pending.last(), Some(&Message::user("next")));
        assert_eq!(conv.message_count(), 3);
    }
}
