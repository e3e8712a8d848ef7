use std::collections::HashMap;

use chrono::Local;
use rmcp::model::Tool;

pub const STEP_LIMIT_MESSAGE: &str = "I've reached the maximum number of steps I can take for this request without finishing it. Please narrow the request down or try again.";

pub const STEP_LIMIT_INSTRUCTION: &str = "You have used all available tool steps. Do not call any more tools. Answer the request now using only the information gathered so far, and say which parts you could not complete.";

/// System prompt for a tool-using travel assistant
pub fn system_prompt(tools: &[Tool], instructions: &HashMap<String, String>) -> String {
    let mut prompt = format!(
        "You are TravelPilot, a helpful travel planning assistant.\n\
         The current date is {}.\n\
         Use the available tools to look up real accommodation data instead of guessing. \
         When you present listings, include the price, the rating when available and the link.\n",
        Local::now().format("%Y-%m-%d")
    );

    if !tools.is_empty() {
        prompt.push_str("\nAvailable tools:\n");
        for tool in tools {
            let description = tool.description.as_deref().unwrap_or_default();
            prompt.push_str(&format!("- {}: {}\n", tool.name, description));
        }
    }

    let mut names: Vec<&String> = instructions.keys().collect();
    names.sort();
    for name in names {
        prompt.push_str(&format!("\n# {}\n{}\n", name, instructions[name]));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::object;

    #[test]
    fn test_system_prompt_lists_tools_and_instructions() {
        let tools = vec![Tool::new(
            "airbnb__airbnb_search",
            "Search for Airbnb listings",
            object!({ "type": "object" }),
        )];
        let instructions =
            HashMap::from([("airbnb".to_string(), "Always pass ignoreRobotsText.".to_string())]);

        let prompt = system_prompt(&tools, &instructions);
        assert!(prompt.starts_with("You are TravelPilot"));
        assert!(prompt.contains("- airbnb__airbnb_search: Search for Airbnb listings\n"));
        assert!(prompt.contains("# airbnb\nAlways pass ignoreRobotsText."));
    }

    #[test]
    fn test_system_prompt_without_tools() {
        let prompt = system_prompt(&[], &HashMap::new());
        assert!(!prompt.contains("Available tools"));
    }
}
