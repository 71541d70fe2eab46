//! Fixed system turns shown to the orchestrator and the user.

pub const TASK: &str = "You and I (system) will work together with the user to build a prompt for their text task. \
You will interact with the user to gather information and discuss the outputs. \
I will generate outputs from the prompts you suggest and pass them back to you, so that you can discuss them with the user. \
User time is valuable, keep the conversation pragmatic. Make the obvious decisions by yourself. \
Don't greet the user at your first interaction.";

pub const API: &str = "You should communicate with the user and system ONLY via the API described below, and not via direct messages. \
The input parameters to API functions are strings. Enclose them in double quotes, and escape all double quotes inside these strings. \
Format ALL your answers as calls to the following functions:";

pub const EXAMPLES: &str = "The user has provided the following example texts. \
Briefly discuss them with the user before suggesting the prompt. \
Your suggestion should take into account the user comments and corrections. \
Share the suggested prompt with the user before submitting it. \
Remember to communicate only via API calls.";

pub const RESULT_INTRO: &str = "The suggested prompt has produced the following outputs for the user examples:";

pub const ANALYZE_RESULTS: &str = "For each example show the full produced output to the user and discuss it with them, one example at a time. \
Call switch_to_example before discussing an example. The discussion should result in an output accepted by the user.\n\
When the user accepts an output (directly or indirectly), call output_accepted passing the example number and the output text. \
Continue your conversation with the user in any case.\n\
Remember that the goal is a prompt that would directly produce outputs like the ones approved by the user.\n\
Remember to communicate only via API calls.";

pub const END_OF_DISCUSSION: &str = "All outputs of the current prompt were discussed. \
If the accepted outputs match what the prompt produced, inform the user and call done(). \
If the outputs had to be adjusted, suggest a new prompt that would produce those outputs directly, share it with the user and submit it.\n\
Remember to communicate only via API calls.";

pub const COMPARISON_NOTE: &str = "Comparison of the new outputs with the previous discussion:";

pub const PARSE_ERROR: &str = "Your last response contained text outside of API calls. \
Communicate only via the declared API calls; put any message for the user inside submit_message_to_user.";

pub const SYNTAX_ERROR: &str = "The last API call produced a syntax error. Return the same call with fixed error.";

pub const WELCOME: &str = "Hello! I'm a prompt building assistant, and I'm here to help you build an effective instruction, personalized to your text task. \
At a high level, we will work together through the following two stages:\n\
1. Agree on an initial zero-shot prompt based on a few example texts you share, and your feedback.\n\
2. Refine the prompt and add a few examples, approved by you, to turn it into a few-shot prompt.\n\
Once done, the prompts are saved in the session directory and you can use them for your task.";

/// Re-introduction of one example's output when the discussion switches to it.
pub fn example_focus(number: usize, text: &str, output: &str) -> String {
    format!(
        "You are now discussing example {number}.\nText: {text}\nProduced output: {output}"
    )
}

pub fn example_line(number: usize, text: &str) -> String {
    format!("Example {number}: {text}")
}
