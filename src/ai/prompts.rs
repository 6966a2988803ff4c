//! Prompt text for the SQL assistant.

/// System and user prompt for a query suggestion.
pub fn suggest_prompt(
    parameter_name: &str,
    description: &str,
    schema: &str,
    date_token: &str,
) -> (String, String) {
    let system = format!(
        "You are an expert SQL query generator. Based on the parameter name and a description \
         of the data needed, you will generate an SQL query to retrieve the data from a SQLite \
         database.\n\n\
         {}\n\
         The query must return a single value in the first column of the first row. \
         Reply with the SQL only, no explanation and no Markdown.",
        context(schema, date_token)
    );
    let user = format!(
        "Parameter Name: {}\nDescription: {}\n\nSQL Query:",
        parameter_name, description
    );
    (system, user)
}

/// System and user prompt for a query verification.
pub fn verify_prompt(
    sql: &str,
    expected: &str,
    schema: &str,
    date_token: &str,
) -> (String, String) {
    let system = format!(
        "You are an expert SQL query verifier.\n\n\
         You will receive a SQL query and a description of the expected data for a report \
         parameter. Your task is to determine if the SQL query is suitable for retrieving the \
         expected data.\n\n\
         {}\n\
         Consider the following:\n\
         - Does the query retrieve the type of data described in the data description?\n\
         - Does the query return the data in a format that is usable for the report parameter?\n\
         - Are there any potential issues with the query that could cause it to fail or return \
         incorrect data?\n\n\
         Based on your analysis, determine if the SQL query is suitable for the expected data \
         and provide a reason for your determination. Reply with a single JSON object of the \
         form {{\"isSuitable\": true, \"reason\": \"...\"}} and nothing else.",
        context(schema, date_token)
    );
    let user = format!(
        "SQL Query: {}\nExpected Data Description: {}",
        sql, expected
    );
    (system, user)
}

fn context(schema: &str, date_token: &str) -> String {
    let schema = if schema.trim().is_empty() {
        "(no tables)"
    } else {
        schema.trim()
    };
    format!(
        "Database schema:\n{}\n\n\
         The literal token {} in a query is replaced with the report month as 'YYYY-MM' before \
         execution; compare it with strftime('%Y-%m', <date column>) to filter by month.\n",
        schema, date_token
    )
}
