use once_cell::sync::Lazy;
use regex::Regex;

/**
 * \brief 兜底回复的主题分类，顺序即匹配优先级。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Greeting,
    Mattress,
    Upholstery,
    Vehicle,
    Residential,
    Pricing,
    Scheduling,
    General,
}

const GREETING: &str = "Olá! Sou o assistente da Limpeza Profissional. Posso ajudar com limpeza de colchões, sofás, carros e residências, além de informar preços e horários. Como posso ajudar hoje?";

const MATTRESS: &str = "Nossa limpeza de colchão remove ácaros, manchas e odores com higienização a seco e extração profunda. O serviço custa a partir de R$ 150, leva de 2 a 3 horas e recomendamos repetir a cada 6 meses.";

const UPHOLSTERY: &str = "Fazemos limpeza e higienização de sofás, poltronas e estofados em geral, com produtos adequados a cada tecido. O serviço custa a partir de R$ 120, leva de 2 a 4 horas e o ideal é repetir a cada 3 a 6 meses.";

const VEHICLE: &str = "A limpeza automotiva inclui aspiração, higienização de bancos, carpetes e teto, além da remoção de odores. O serviço custa a partir de R$ 80 e leva de 1 a 2 horas. Recomendamos uma limpeza por mês.";

const RESIDENTIAL: &str = "A limpeza residencial cobre todos os cômodos, incluindo cozinha, banheiros, pisos e vidros. O serviço custa a partir de R$ 200 e leva de 4 a 6 horas, com frequência combinada conforme a sua necessidade.";

const PRICING: &str = "Nossos preços de referência: colchão a partir de R$ 150, sofá a partir de R$ 120, carro a partir de R$ 80, residencial a partir de R$ 200 e tapetes a partir de R$ 100. Limpeza comercial é sob consulta. Para um orçamento exato, conte-nos o tamanho e o estado do item.";

const SCHEDULING: &str = "Atendemos de segunda a sábado, das 8h às 18h. Domingos e feriados mediante agendamento prévio. Para marcar um horário, use a seção de agendamento do site informando o serviço e a data desejada.";

const GENERAL: &str = "Posso ajudar com informações sobre limpeza de colchões, sofás e estofados, carros, residências e espaços comerciais, além de preços e agendamento. Sobre qual serviço você gostaria de saber mais?";

struct Rule {
    topic: Topic,
    pattern: Regex,
    reply: &'static str,
}

fn rule(topic: Topic, pattern: &str, reply: &'static str) -> Rule {
    Rule {
        topic,
        pattern: Regex::new(pattern).expect("fallback pattern must compile"),
        reply,
    }
}

// 服务类关键字先于价格关键字匹配："quanto custa a limpeza de sofá" 命中 Upholstery。
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            Topic::Greeting,
            r"^(ol[aá]|oi+e?|bom dia|boa tarde|boa noite|hello|hey)\b",
            GREETING,
        ),
        rule(Topic::Mattress, r"colch[aãoõ]|[aá]caro", MATTRESS),
        rule(
            Topic::Upholstery,
            r"sof[aá]|estofad|poltrona|tapete",
            UPHOLSTERY,
        ),
        rule(
            Topic::Vehicle,
            r"\bcarros?\b|autom[oó]v|automotiv|ve[ií]culo",
            VEHICLE,
        ),
        rule(
            Topic::Residential,
            r"\bcasas?\b|resid[eê]n|apartamento|faxina",
            RESIDENTIAL,
        ),
        rule(
            Topic::Pricing,
            r"pre[cç]o|valor|\bcusta|\bcusto|or[cç]amento",
            PRICING,
        ),
        rule(
            Topic::Scheduling,
            r"agend|hor[aá]rio|marcar|dispon[ií]ve|\bquando\b",
            SCHEDULING,
        ),
    ]
});

/**
 * \brief 按固定优先级匹配主题，首个命中即返回。
 */
pub fn classify(text: &str) -> Topic {
    let normalized = text.trim().to_lowercase();
    RULES
        .iter()
        .find(|r| r.pattern.is_match(&normalized))
        .map(|r| r.topic)
        .unwrap_or(Topic::General)
}

/**
 * \brief 无可用远端回复时的本地兜底回复，纯函数，永不为空。
 */
pub fn fallback_response(text: &str) -> &'static str {
    reply_for(classify(text))
}

pub fn reply_for(topic: Topic) -> &'static str {
    match topic {
        Topic::Greeting => GREETING,
        Topic::General => GENERAL,
        other => RULES
            .iter()
            .find(|r| r.topic == other)
            .map(|r| r.reply)
            .unwrap_or(GENERAL),
    }
}
