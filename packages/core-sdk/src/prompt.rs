use crate::models::{Message, Role};

/**
 * \brief 清洁服务助手的 system 提示。
 */
pub const SYSTEM_PROMPT: &str = "Você é o assistente virtual da \"Limpeza Profissional\", especializado em serviços de limpeza.

SERVIÇOS DISPONÍVEIS:
- Limpeza de Colchão: a partir de R$ 150, duração 2-3 horas, recomendada a cada 6 meses
- Limpeza de Sofá: a partir de R$ 120, duração 2-4 horas, recomendada a cada 3-6 meses
- Limpeza de Carro: a partir de R$ 80, duração 1-2 horas, recomendada mensalmente
- Limpeza Residencial: a partir de R$ 200, duração 4-6 horas, frequência variável
- Limpeza Comercial: preço sob consulta, contratos personalizados
- Limpeza de Tapetes: a partir de R$ 100, duração 2-3 horas, recomendada a cada 6 meses

HORÁRIOS: segunda a sábado, 8h às 18h; domingos e feriados mediante agendamento prévio.

Seja amigável, profissional e prestativo, responda sempre em português brasileiro e direcione pedidos de agendamento para a seção de agendamento.";

pub const SYSTEM_LABEL: &str = "Sistema:";
pub const USER_LABEL: &str = "Usuário:";
pub const ASSISTANT_LABEL: &str = "Assistente:";

fn label(role: Role) -> &'static str {
    match role {
        Role::System => SYSTEM_LABEL,
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
    }
}

/**
 * \brief 将对话渲染为单段提示文本，末尾留出助手标记，供单提示类 Provider 使用。
 */
pub fn render_prompt(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        out.push_str(label(msg.role));
        out.push(' ');
        out.push_str(msg.content.trim());
        out.push_str("\n\n");
    }
    out.push_str(ASSISTANT_LABEL);
    out
}

/**
 * \brief 去除模型回显的提示片段。
 * \details 若出现助手标记，只保留最后一个标记之后的文本；若其后又出现用户标记，则截断到该处。
 */
pub fn strip_echoed_markers(text: &str) -> String {
    let mut reply = match text.rfind(ASSISTANT_LABEL) {
        Some(pos) => &text[pos + ASSISTANT_LABEL.len()..],
        None => text,
    };
    if let Some(pos) = reply.find(USER_LABEL) {
        reply = &reply[..pos];
    }
    reply.trim().to_string()
}
