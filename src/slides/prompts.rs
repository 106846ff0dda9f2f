use chrono::{DateTime, Local};

use crate::llm::LlmMessage;

fn section(heading: &str, body: Option<&str>) -> String {
    match body.filter(|text| !text.trim().is_empty()) {
        Some(text) => format!("# {heading}:\n{text}\n\n"),
        None => String::new(),
    }
}

pub fn system_prompt(tone: Option<&str>, verbosity: Option<&str>, instructions: Option<&str>) -> String {
    let mut prompt = String::from("Generate structured slide content based on the provided outline.\n\n");
    prompt.push_str(&section("User Instructions", instructions));
    prompt.push_str(&section("Tone", tone));
    prompt.push_str(&section("Verbosity", verbosity));
    prompt.push_str(
        r#"# CRITICAL RULES
1. **STRICTLY FOLLOW THE OUTLINE**: Generate content exactly as described in the outline. Do not invent new topics or change the meaning.
2. **LANGUAGE**: All visible text (titles, paragraphs, lists, speaker notes) MUST be in the target language. Only prompts and queries (keys starting with __) are written in English.
3. **IMAGES & ICONS**:
   - If the schema has `backgroundImage`, `image` or `heroImage`, return an object: `{ "__image_prompt__": "Description of the image" }`.
   - If the schema has `icon` (or similar), return an object: `{ "__icon_query__": "English search term", "__icon_url__": "/static/icons/placeholder.svg" }`.
   - Do not return a string URL for images or icons unless it is a valid public URL. Prefer the prompt.
   - Do not invent new fields. Use only the fields defined in the schema.

# Notes
- Slide body should not use words like "This slide" or "This presentation".
- Rephrase the slide body so it flows naturally.
- Only use markdown to highlight important points.
- Speaker note should be normal text, not markdown.
- Strictly follow the max and min character limits.
- Metrics should be abbreviated.
- Do not add emojis.

- IMPORTANT: Provide output in JSON format and don't include <parameters> tags.
- IMPORTANT: The output must strictly follow the provided JSON schema. Do not wrap the response in a "slide" object.
"#,
    );
    prompt
}

pub fn user_prompt(outline: &str, language: &str, now: DateTime<Local>) -> String {
    format!(
        "## Current Date and Time\n{}\n\n\
         ## Target Language\n{language} (All visible content must be in this language)\n\n\
         ## Image/Icon Prompt Language\n\
         - Image Prompts: the target language if it is Chinese, otherwise English.\n\
         - Icon Search Queries: English (Always).\n\n\
         ## Slide Outline (STRICTLY FOLLOW THIS)\n{outline}\n",
        now.format("%Y-%m-%d %H:%M:%S"),
    )
}

pub fn messages(
    outline: &str,
    language: &str,
    tone: Option<&str>,
    verbosity: Option<&str>,
    instructions: Option<&str>,
) -> Vec<LlmMessage> {
    vec![
        LlmMessage::system(system_prompt(tone, verbosity, instructions)),
        LlmMessage::user(user_prompt(outline, language, Local::now())),
    ]
}
