//! 首页示例卡片数据

use serde::Serialize;

/// 代码示例
#[derive(Debug, Clone, Serialize)]
pub struct CodeExample {
    pub title: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    pub language: &'static str,
    pub code: &'static str,
}

impl CodeExample {
    /// 发送给模型的完整 prompt
    pub fn full_prompt(&self) -> String {
        format!("{}\n\nCode:\n{}", self.prompt, self.code)
    }

    pub fn view(&self) -> ExampleView<'_> {
        ExampleView {
            example: self,
            full_prompt: self.full_prompt(),
        }
    }
}

/// /api/examples 返回的单项，附带拼好的 prompt
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleView<'a> {
    #[serde(flatten)]
    example: &'a CodeExample,
    full_prompt: String,
}

pub const CODE_EXAMPLES: &[CodeExample] = &[
    CodeExample {
        title: "Code Completion",
        description: "Complete code based on context and comments",
        language: "typescript",
        code: "// Create a function that sorts an array of objects by a key
interface User {
  name: string;
  age: number;
}

function sortUsersByAge",
        prompt: "Complete this TypeScript function to sort users by age in ascending order",
    },
    CodeExample {
        title: "Code Review",
        description: "Review code for potential issues and improvements",
        language: "python",
        code: "def process_data(data):
    results = []
    for i in range(len(data)):
        if data[i] > 0:
            results.append(data[i] * 2)
    return results",
        prompt: "Review this Python code for performance, style, and potential improvements",
    },
    CodeExample {
        title: "Bug Fixing",
        description: "Find and fix bugs in code",
        language: "javascript",
        code: "function fibonacci(n) {
    if (n <= 0) return 0;
    if (n == 1) return 1;
    return fibonacci(n) + fibonacci(n - 1);
}",
        prompt: "Find and fix the bug in this recursive Fibonacci implementation",
    },
    CodeExample {
        title: "Code Explanation",
        description: "Explain complex code or algorithms",
        language: "rust",
        code: "fn quick_sort<T: Ord>(arr: &mut [T]) {
    if arr.len() <= 1 {
        return;
    }
    let pivot = partition(arr);
    quick_sort(&mut arr[0..pivot]);
    quick_sort(&mut arr[pivot + 1..]);
}",
        prompt: "Explain how this Rust quicksort implementation works",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_prompt() {
        let example = &CODE_EXAMPLES[2];
        let prompt = example.full_prompt();
        assert!(prompt.starts_with("Find and fix the bug"));
        assert!(prompt.contains("\n\nCode:\nfunction fibonacci(n) {"));
    }

    #[test]
    fn test_view_serializes_full_prompt() {
        let json = serde_json::to_value(CODE_EXAMPLES[0].view()).unwrap();
        assert_eq!(json["title"], "Code Completion");
        assert_eq!(json["language"], "typescript");
        assert!(json["fullPrompt"].as_str().unwrap().ends_with("function sortUsersByAge"));
    }

    #[test]
    fn test_titles_unique() {
        let mut titles: Vec<_> = CODE_EXAMPLES.iter().map(|e| e.title).collect();
        titles.sort();
        titles.dedup();
        assert_eq!(titles.len(), CODE_EXAMPLES.len());
    }
}
