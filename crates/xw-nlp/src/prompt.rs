//! Prompt assembly for the command parser.
//!
//! The instructions, examples, compressed history and router snapshot go in
//! the system message; the sanitized player input alone is the user message.

use xw_protocol::{ChatMessage, CompletionRequest, RouteSnapshot};

/// Maximum sanitized input length in characters.
const MAX_INPUT_CHARS: usize = 500;

/// Replacement for input that sanitizes to nothing.
pub const EMPTY_INPUT: &str = "未知命令";

const PARSE_PROMPT: &str = r#"你是"修仙世界"游戏的命令解析器模块，需要将玩家发来的中文自然语言指令解析为结构化 JSON 格式，供游戏引擎调用。

游戏支持的核心命令包括（但不限于）：
- 探索、修炼、查看状态、打开背包、前往、使用物品、交谈、交易、攻击、防御、逃跑、突破、退出、保存等。

输出格式必须遵循以下 JSON 结构（仅输出 JSON，不要任何多余文本）：
{
  "raw": "<玩家原始输入>",
  "normalized_command": "<标准命令词，若无法匹配填\"未知\">",
  "intent": "<意图类别：action/train/check/move/use/talk/trade/system/unknown>",
  "args": {"location": "丹药铺", "item": "回春丹", "duration": "1时辰"},
  "explanation": "<简短解析依据，不超过20字>",
  "confidence": 0.0
}

示例：
输入: "我想休息一个时辰"
输出: {"raw": "我想休息一个时辰", "normalized_command": "修炼", "intent": "train", "args": {"duration": "1时辰"}, "explanation": "休息即修炼"}

输入: "去丹药铺买药"
输出: {"raw": "去丹药铺买药", "normalized_command": "前往", "intent": "move", "args": {"location": "丹药铺"}, "explanation": "前往丹药铺"}

输入: "先探索再修炼"
输出: {"raw": "先探索再修炼", "normalized_command": ["探索", "修炼"], "intent": "action_sequence", "args": {}, "explanation": "多步指令拆分"}

输入: "和李掌柜聊聊天"
输出: {"raw": "和李掌柜聊聊天", "normalized_command": "交谈", "intent": "talk", "args": {"target": "李掌柜"}, "explanation": "与NPC交谈"}

如果输入无法识别任何命令或过于模糊：normalized_command 填 "未知"，intent 填 "unknown"，args 为空对象。"#;

/// Clean player input before it goes into a prompt.
///
/// Control characters become spaces, backslashes and quotes are escaped,
/// braces are dropped, whitespace is collapsed and length is capped.
pub fn sanitize_input(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '{' | '}' => {}
            '\\' => cleaned.push_str("\\\\"),
            '"' => cleaned.push_str("\\\""),
            c if c.is_control() => cleaned.push(' '),
            c => cleaned.push(c),
        }
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return EMPTY_INPUT.to_string();
    }
    if collapsed.chars().count() > MAX_INPUT_CHARS {
        let head: String = collapsed.chars().take(MAX_INPUT_CHARS).collect();
        return format!("{head}...");
    }
    collapsed
}

/// Extract the JSON object from LLM output that may be wrapped in markdown
/// fences or surrounded by prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        return &trimmed[start..=end];
    }

    trimmed
}

/// Build the system message: instructions, then whatever context exists.
pub fn system_prompt(history: &str, snapshot: Option<&RouteSnapshot>) -> String {
    let mut prompt = PARSE_PROMPT.to_string();

    if let Some(snapshot) = snapshot {
        prompt.push_str("\n\n=== 当前场景 ===\n");
        prompt.push_str(&format!("场景: {}\n", snapshot.context));
        if !snapshot.available_patterns.is_empty() {
            prompt.push_str(&format!(
                "可用命令: {}\n",
                snapshot.available_patterns.join("、")
            ));
        }
        if !snapshot.recent_inputs.is_empty() {
            prompt.push_str(&format!("最近输入: {}\n", snapshot.recent_inputs.join(" | ")));
        }
    }

    if !history.is_empty() {
        prompt.push_str("\n\n=== 对话上下文 ===\n");
        prompt.push_str(history);
    }

    prompt
}

/// Assemble the parse request for one sanitized input.
pub fn parse_request(
    sanitized: &str,
    history: &str,
    snapshot: Option<&RouteSnapshot>,
    temperature: f32,
    max_tokens: u32,
) -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::system(system_prompt(history, snapshot)),
        ChatMessage::user(sanitized),
    ])
    .with_temperature(temperature)
    .with_max_tokens(max_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── sanitize_input ───────────────────────────────────────────

    #[test]
    fn sanitize_strips_control_and_braces() {
        assert_eq!(sanitize_input("修炼\n\t{一下}"), "修炼 一下");
    }

    #[test]
    fn sanitize_escapes_quotes_and_backslashes() {
        assert_eq!(sanitize_input(r#"说"你好"\"#), r#"说\"你好\"\\"#);
    }

    #[test]
    fn sanitize_empty_becomes_placeholder() {
        assert_eq!(sanitize_input("   "), EMPTY_INPUT);
        assert_eq!(sanitize_input("{}"), EMPTY_INPUT);
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "修".repeat(600);
        let out = sanitize_input(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_INPUT_CHARS + 3);
    }

    // ── extract_json ─────────────────────────────────────────────

    #[test]
    fn extract_json_raw() {
        let input = r#"{"normalized_command": "修炼"}"#;
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn extract_json_markdown_json_block() {
        let input = "```json\n{\"intent\": \"train\"}\n```";
        assert_eq!(extract_json(input), "{\"intent\": \"train\"}");
    }

    #[test]
    fn extract_json_markdown_plain_block() {
        let input = "```\n{\"intent\": \"check\"}\n```";
        assert_eq!(extract_json(input), "{\"intent\": \"check\"}");
    }

    #[test]
    fn extract_json_with_surrounding_prose() {
        let input = "好的，解析结果如下：{\"intent\": \"move\"} 希望有帮助";
        assert_eq!(extract_json(input), "{\"intent\": \"move\"}");
    }

    // ── request assembly ─────────────────────────────────────────

    #[test]
    fn user_message_is_input_only() {
        let snapshot = RouteSnapshot {
            context: "battle".into(),
            recent_inputs: vec!["攻击".into()],
            available_patterns: vec!["逃跑".into(), "防御".into()],
        };
        let req = parse_request("修炼", "=== 最近对话 ===\n用户: 探索", Some(&snapshot), 0.0, 256);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.last_user_message(), Some("修炼"));

        let system = &req.messages[0].content;
        assert!(system.contains("场景: battle"));
        assert!(system.contains("可用命令: 逃跑、防御"));
        assert!(system.contains("用户: 探索"));
    }

    #[test]
    fn no_context_sections_without_context() {
        let system = system_prompt("", None);
        assert!(!system.contains("=== 当前场景 ==="));
        assert!(!system.contains("=== 对话上下文 ==="));
    }
}
