//! 提示词模板
//!
//! 所有提示词都是西班牙语，且要求模型只输出 JSON（规范化阶段除外，输出纯文本）。

use crate::services::normalizer::NormalizeContext;

/// OCR 文本规范化
pub fn normalize_prompt(raw_text: &str, context: NormalizeContext) -> String {
    let context_instructions = match context {
        NormalizeContext::Exam => {
            "Este texto es la respuesta de un estudiante a una prueba. Conserva la numeración \
             de preguntas, las alternativas marcadas y el razonamiento del estudiante tal como \
             fue escrito, sin corregir su contenido."
        }
        NormalizeContext::AnswerKey => {
            "Este texto es una pauta de corrección. Conserva cada pregunta con su respuesta \
             correcta y la numeración original."
        }
        NormalizeContext::Generic => "Conserva la estructura y el significado del texto.",
    };

    format!(
        r#"Eres un asistente que limpia texto obtenido por OCR.

Tareas:
1. Corrige errores evidentes de reconocimiento (caracteres cambiados, palabras cortadas, saltos de línea erróneos).
2. Une las líneas que pertenecen al mismo párrafo y elimina ruido (números de página, marcas de agua, encabezados repetidos).
3. NO inventes contenido, NO resumas y NO agregues comentarios.

{context_instructions}

Devuelve únicamente el texto normalizado, sin introducciones ni explicaciones.

TEXTO OCR:
---
{raw_text}
---"#
    )
}

/// 过滤与作答无关的内容
pub fn filter_prompt(text: &str, context: NormalizeContext) -> String {
    let keep = match context {
        NormalizeContext::Exam => "las preguntas y las respuestas del estudiante",
        NormalizeContext::AnswerKey => "las preguntas y sus respuestas correctas",
        NormalizeContext::Generic => "el contenido académico relevante",
    };

    format!(
        r#"Del siguiente texto conserva solo {keep}.
Elimina instrucciones administrativas, datos del colegio, espacios para firmas y cualquier texto que no aporte a la evaluación.
No modifiques el contenido que conserves.

Devuelve únicamente el texto filtrado, sin introducciones ni explicaciones.

TEXTO:
---
{text}
---"#
    )
}

/// 按评分细则评分
pub fn rubric_evaluation_prompt(student_text: &str, rubric_json: &str) -> String {
    format!(
        r#"Eres un profesor experto que evalúa pruebas de estudiantes usando una rúbrica.

RÚBRICA (JSON):
{rubric_json}

RESPUESTA DEL ESTUDIANTE:
---
{student_text}
---

Evalúa cada criterio o pregunta de la rúbrica con un puntaje de 0 a 10.
Responde SOLO con un objeto JSON con esta forma:
{{
  "overall_score": <porcentaje de logro total de 0 a 100>,
  "general_feedback": "<retroalimentación general>",
  "confidence": <confianza de 0 a 1>,
  "detailed_scores": {{
    "<id de pregunta o criterio>": {{
      "student_answer": "<respuesta del estudiante>",
      "correct_answer": "<respuesta esperada según la rúbrica>",
      "evaluation": "<Correcta | Parcialmente Correcta | Incorrecta | No Respondida>",
      "feedback": "<retroalimentación específica>",
      "score": <puntaje de 0 a 10>
    }}
  }}
}}"#
    )
}

/// 按标准答案直接评分
pub fn direct_evaluation_prompt(student_text: &str, answer_key_text: &str) -> String {
    format!(
        r#"Eres un profesor experto. Compara la prueba del estudiante con la pauta de corrección.

PAUTA DE CORRECCIÓN:
---
{answer_key_text}
---

PRUEBA DEL ESTUDIANTE:
---
{student_text}
---

Identifica cada pregunta de la pauta, busca la respuesta del estudiante y asígnale un puntaje de 0 a 10.
Responde SOLO con un objeto JSON con esta forma:
{{
  "overall_score": <porcentaje de logro total de 0 a 100>,
  "general_feedback": "<retroalimentación general>",
  "confidence": <confianza de 0 a 1>,
  "detailed_scores": {{
    "<número de pregunta>": {{
      "student_answer": "<respuesta del estudiante>",
      "correct_answer": "<respuesta de la pauta>",
      "evaluation": "<Correcta | Parcialmente Correcta | Incorrecta | No Respondida>",
      "feedback": "<retroalimentación específica>",
      "score": <puntaje de 0 a 10>
    }}
  }}
}}"#
    )
}

/// 阶段 A：分析标准答案结构
pub fn structure_analysis_prompt(answer_key_text: &str) -> String {
    format!(
        r#"Analiza la siguiente pauta de corrección y extrae su estructura.

PAUTA:
---
{answer_key_text}
---

Responde SOLO con un objeto JSON con esta forma:
{{
  "total_questions": <número de preguntas>,
  "numbering_format": "<formato de numeración, por ejemplo '1.', 'a)', 'I.'>",
  "questions": [
    {{ "id": "<identificador de la pregunta>", "text": "<enunciado>", "answer": "<respuesta correcta>" }}
  ]
}}"#
    )
}

/// 阶段 B：按结构提取学生答案
pub fn answer_extraction_prompt(student_text: &str, structure_json: &str) -> String {
    format!(
        r#"Extrae las respuestas del estudiante para cada pregunta de la estructura indicada.

ESTRUCTURA DE LA PRUEBA (JSON):
{structure_json}

PRUEBA DEL ESTUDIANTE:
---
{student_text}
---

Responde SOLO con un objeto JSON cuyas claves sean los "id" de las preguntas y cuyos valores sean la respuesta textual del estudiante.
Si no encuentras la respuesta a una pregunta usa exactamente el valor "No encontrada"."#
    )
}

/// 阶段 C：逐题评分
pub fn structured_evaluation_prompt(questions_json: &str) -> String {
    format!(
        r#"Evalúa cada respuesta del estudiante comparándola con la respuesta esperada.

PREGUNTAS (JSON):
{questions_json}

Asigna a cada pregunta un puntaje de 0 a 10 ("No encontrada" equivale a 0).
Responde SOLO con un objeto JSON cuyas claves sean los "id" de las preguntas:
{{
  "<id>": {{
    "evaluation": "<Correcta | Parcialmente Correcta | Incorrecta | No Respondida>",
    "feedback": "<retroalimentación específica>",
    "score": <puntaje de 0 a 10>
  }}
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_inputs() {
        let prompt = rubric_evaluation_prompt("mi respuesta", "{\"q1\": 10}");
        assert!(prompt.contains("mi respuesta"));
        assert!(prompt.contains("{\"q1\": 10}"));
        assert!(prompt.contains("\"overall_score\""));

        let prompt = normalize_prompt("txt", NormalizeContext::AnswerKey);
        assert!(prompt.contains("pauta de corrección"));

        let prompt = answer_extraction_prompt("alumno", "{}");
        assert!(prompt.contains(crate::models::ANSWER_NOT_FOUND));
    }
}
