use crate::intelligence::types::ClinicalContext;
use crate::models::VitalChannel;

use super::RECOMMENDATION_COUNT;

pub const RECOMMENDATION_SYSTEM_PROMPT: &str = r#"Você é um assistente de enfermagem hospitalar. Você apoia a equipe de enfermagem com recomendações de cuidado. Você NÃO substitui a avaliação médica.

REGRAS DE SAÍDA — SEM EXCEÇÕES:
1. Responda em português do Brasil.
2. Produza EXATAMENTE 5 itens numerados, um por linha, no formato "1. ", "2. ", ..., "5. ".
3. Cada item deve ter no máximo 500 caracteres, começar com letra maiúscula e terminar com ponto final.
4. Não escreva introdução, conclusão, títulos, markdown ou texto fora dos 5 itens.
5. Baseie-se SOMENTE no contexto clínico fornecido."#;

/// Theme of each item, in order.
pub const RECOMMENDATION_THEMES: [&str; RECOMMENDATION_COUNT] = [
    "Medicações: revisão, horários e interações",
    "Monitoramento: sinais vitais e sinais de alerta",
    "Cuidados paliativos: conforto e controle de sintomas",
    "Orientações ao cuidador: cuidados em casa e segurança",
    "Acompanhamento: retornos, exames e encaminhamentos",
];

/// Build the user prompt for one patient context.
pub fn build_recommendation_prompt(context: &ClinicalContext) -> String {
    let mut prompt = String::from("<CONTEXTO_CLINICO>\n");

    match context.age {
        Some(age) => prompt.push_str(&format!("Idade: {age} anos\n")),
        None => prompt.push_str("Idade: não informada\n"),
    }
    prompt.push_str(&format!("Nível de risco: {}\n", context.risk_level.label_pt()));
    prompt.push_str(&format!("Diagnósticos: {}\n", join_or_none(&context.diagnoses)));
    prompt.push_str(&format!("Procedimentos: {}\n", join_or_none(&context.procedures)));

    let medications: Vec<String> = context
        .medications
        .iter()
        .filter(|m| m.is_active())
        .map(|m| match &m.dosage {
            Some(d) => format!("{} {}{}", m.name.trim(), d.value, d.unit),
            None => m.name.trim().to_string(),
        })
        .collect();
    prompt.push_str(&format!("Medicações em uso: {}\n", join_or_none(&medications)));

    if let Some(vitals) = &context.latest_vitals {
        let mut parts = Vec::new();
        if let Some(t) = vitals.temperature {
            parts.push(format!(
                "temperatura {t:.1} {}",
                VitalChannel::Temperature.default_unit()
            ));
        }
        if let Some(bp) = &vitals.blood_pressure {
            parts.push(format!("PA {bp} mmHg"));
        }
        if let Some(hr) = vitals.heart_rate {
            parts.push(format!("FC {hr:.0} {}", VitalChannel::HeartRate.default_unit()));
        }
        if let Some(spo2) = vitals.oxygen_saturation {
            parts.push(format!(
                "SpO2 {spo2:.0}{}",
                VitalChannel::OxygenSaturation.default_unit()
            ));
        }
        if let Some(rr) = vitals.respiratory_rate {
            parts.push(format!("FR {rr:.0} irpm"));
        }
        prompt.push_str(&format!("Sinais vitais recentes: {}\n", join_or_none(&parts)));
    }

    let care = &context.care_status;
    prompt.push_str(&format!(
        "Mobilidade: {}\nConsciência: {}\nDor (0-10): {}\nNutrição: {}\nRespiração: {}\n",
        care.mobility, care.consciousness, care.pain_level, care.nutrition, care.respiratory
    ));
    if !care.special_needs.is_empty() {
        prompt.push_str(&format!(
            "Necessidades especiais: {}\n",
            care.special_needs.join(", ")
        ));
    }
    prompt.push_str("</CONTEXTO_CLINICO>\n\n");

    prompt.push_str("Escreva exatamente 5 recomendações, nesta ordem:\n");
    for (i, theme) in RECOMMENDATION_THEMES.iter().enumerate() {
        prompt.push_str(&format!("{}. {theme}\n", i + 1));
    }
    prompt.push_str("\nResponda somente com os 5 itens numerados.");

    prompt
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "nenhum".to_string()
    } else {
        items.join(", ")
    }
}
