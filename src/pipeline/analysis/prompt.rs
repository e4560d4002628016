/// Fixed instruction sent ahead of the report text.
pub const ANALYSIS_INSTRUCTIONS: &str = r#"You are a medical laboratory report analyst. Read the blood test report below and extract every test result into JSON.

Respond with ONLY a JSON object, no prose, using exactly this schema:
{
  "patientInfo": {
    "name": "string", "age": "string", "gender": "string", "dateOfBirth": "string",
    "patientId": "string", "collectionDate": "string", "reportDate": "string",
    "doctorName": "string", "hospitalName": "string"
  },
  "metrics": [
    {
      "name": "test name exactly as written in the report",
      "value": "number, or the original text if not numeric",
      "unit": "string",
      "status": "normal | low_risk | medium_risk | high_risk",
      "range": "reference range as written, e.g. 13.5 - 17.5",
      "description": "one sentence on what the test measures",
      "category": "e.g. Blood Count, Lipids, Liver, Kidney, Thyroid, Other",
      "visualIndicator": "H | L | M | ↑ | ↓ (only if flagged in the report)",
      "riskLevel": "normal | low | medium | high",
      "trend": "increasing | decreasing | stable"
    }
  ],
  "summary": "at least two sentences summarizing the overall results",
  "detailedAnalysis": "a detailed paragraph explaining abnormal results",
  "recommendations": ["actionable recommendation", "..."],
  "categories": ["categories present in metrics"]
}

Rules:
- Include every test result in the report, including normal ones.
- Omit patientInfo fields that are not present; never invent values.
- Use the report's own reference ranges and flags.
- Do not give a diagnosis."#;

/// Build the analysis prompt for one report's text.
pub fn build_analysis_prompt(report_text: &str) -> String {
    format!(
        "{ANALYSIS_INSTRUCTIONS}\n\n--- REPORT START ---\n{}\n--- REPORT END ---",
        report_text.trim()
    )
}
