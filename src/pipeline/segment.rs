//! Encounter segmentation.
//!
//! One scanned chart often holds many service encounters back to back. The
//! delimiter (e.g. `Consumer Service ID:`) opens each encounter. Delimiters
//! are located by line index in the content transcript; the LINE-block
//! transcript is scanned too, but only for a diagnostic count.

use serde::{Deserialize, Serialize};

use super::ocr::{FormDictionary, NormalizationMetadata, NormalizedDocument};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncounterMetadata {
    #[serde(flatten)]
    pub document: NormalizationMetadata,
    #[serde(rename = "encounter_index")]
    pub index: usize,
    #[serde(rename = "is_split_encounter")]
    pub is_split: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(
        rename = "total_delimiters_in_line_blocks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub delimiters_in_line_text: Option<usize>,
}

impl EncounterMetadata {
    /// Half-open content line range for split encounters.
    pub fn line_range(&self) -> Option<(usize, usize)> {
        self.start_line.zip(self.end_line)
    }
}

/// One clinical encounter, as written to the processed folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub text: String,
    #[serde(default)]
    pub metadata: EncounterMetadata,
    /// Form pairs of the whole document; only carried by unsplit encounters.
    #[serde(default, skip_serializing_if = "FormDictionary::is_empty")]
    pub forms: FormDictionary,
}

fn delimiter_lines(lines: &[&str], delimiter: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(delimiter))
        .map(|(idx, _)| idx)
        .collect()
}

/// Split `doc` into encounters. Always returns at least one.
pub fn segment(doc: &NormalizedDocument, delimiter: &str, is_irp: bool) -> Vec<Encounter> {
    if is_irp {
        return vec![Encounter {
            text: doc.primary_text.clone(),
            metadata: EncounterMetadata {
                document: doc.metadata.clone(),
                ..EncounterMetadata::default()
            },
            forms: doc.forms.clone(),
        }];
    }

    let line_text_lines: Vec<&str> = doc.line_text.split('\n').collect();
    let line_delimiters = delimiter_lines(&line_text_lines, delimiter);

    let (content_text, content_lines, delimiters) = if doc.primary_text.is_empty() {
        (&doc.line_text, line_text_lines, line_delimiters.clone())
    } else {
        let lines: Vec<&str> = doc.primary_text.split('\n').collect();
        let found = delimiter_lines(&lines, delimiter);
        (&doc.primary_text, lines, found)
    };

    tracing::debug!(
        delimiter,
        in_line_text = line_delimiters.len(),
        in_content = delimiters.len(),
        "Located encounter delimiters"
    );

    if delimiters.len() <= 1 {
        return vec![Encounter {
            text: content_text.clone(),
            metadata: EncounterMetadata {
                document: doc.metadata.clone(),
                line_count: Some(content_lines.len()),
                ..EncounterMetadata::default()
            },
            forms: doc.forms.clone(),
        }];
    }

    delimiters
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = delimiters.get(i + 1).copied().unwrap_or(content_lines.len());
            let slice = &content_lines[start..end];
            Encounter {
                text: slice.join("\n"),
                metadata: EncounterMetadata {
                    document: doc.metadata.clone(),
                    index: i,
                    is_split: true,
                    line_count: Some(slice.len()),
                    start_line: Some(start),
                    end_line: Some(end),
                    delimiters_in_line_text: Some(line_delimiters.len()),
                },
                forms: FormDictionary::default(),
            }
        })
        .collect()
}

/// Identifier printed after `id_field` on the first line that carries it:
/// the first whitespace token, with `/` and spaces made path-safe.
pub fn encounter_id(encounter: &Encounter, id_field: &str) -> Option<String> {
    let line = encounter.text.lines().find(|line| line.contains(id_field))?;
    let (_, rest) = line.split_once(id_field)?;
    let token = rest.split_whitespace().next()?;
    Some(token.replace(['/', ' '], "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIM: &str = "Consumer Service ID:";

    fn doc(primary: &str, lines: &str) -> NormalizedDocument {
        NormalizedDocument {
            primary_text: primary.to_string(),
            line_text: lines.to_string(),
            ..NormalizedDocument::default()
        }
    }

    #[test]
    fn splits_on_each_delimiter() {
        let text = "Header\nConsumer Service ID: 100\nNote A\nConsumer Service ID: 200\nNote B\nNote C";
        let encounters = segment(&doc(text, text), DELIM, false);

        assert_eq!(encounters.len(), 2);
        assert_eq!(encounters[0].text, "Consumer Service ID: 100\nNote A");
        assert_eq!(encounters[1].text, "Consumer Service ID: 200\nNote B\nNote C");
        assert_eq!(encounters[1].metadata.index, 1);
        assert!(encounters[1].metadata.is_split);
        assert_eq!(encounters[1].metadata.line_range(), Some((3, 6)));
        assert_eq!(encounters[1].metadata.line_count, Some(3));
        assert_eq!(encounters[0].metadata.delimiters_in_line_text, Some(2));
    }

    #[test]
    fn k_encounters_reconstruct_from_first_delimiter() {
        let text = "preamble\nConsumer Service ID: 1\na\nConsumer Service ID: 2\nb\nConsumer Service ID: 3\nc";
        let encounters = segment(&doc(text, ""), DELIM, false);
        assert_eq!(encounters.len(), 3);

        let rebuilt: Vec<&str> = encounters.iter().map(|e| e.text.as_str()).collect();
        let expected = text.split_once('\n').unwrap().1;
        assert_eq!(rebuilt.join("\n"), expected);
    }

    #[test]
    fn single_or_no_delimiter_yields_one_encounter() {
        for text in ["no markers here", "Consumer Service ID: 1\nbody"] {
            let encounters = segment(&doc(text, text), DELIM, false);
            assert_eq!(encounters.len(), 1);
            assert_eq!(encounters[0].text, text);
            assert!(!encounters[0].metadata.is_split);
            assert_eq!(encounters[0].metadata.line_range(), None);
        }
    }

    #[test]
    fn content_delimiters_are_authoritative() {
        // LINE blocks show two delimiters, form content only one.
        let lines = "Consumer Service ID: 1\nConsumer Service ID: 2";
        let primary = "Consumer Service ID: 1\nbody";
        let encounters = segment(&doc(primary, lines), DELIM, false);
        assert_eq!(encounters.len(), 1);
        assert_eq!(encounters[0].text, primary);
    }

    #[test]
    fn falls_back_to_line_text_without_primary() {
        let lines = "Consumer Service ID: 1\nx\nConsumer Service ID: 2\ny";
        let encounters = segment(&doc("", lines), DELIM, false);
        assert_eq!(encounters.len(), 2);
        assert_eq!(encounters[0].text, "Consumer Service ID: 1\nx");
    }

    #[test]
    fn irp_documents_are_never_split() {
        let text = "Consumer Service ID: 1\na\nConsumer Service ID: 2\nb";
        let mut document = doc(text, text);
        document.forms.push("Consumer Name:", "Jane Roe", 90.0);
        let encounters = segment(&document, DELIM, true);
        assert_eq!(encounters.len(), 1);
        assert_eq!(encounters[0].text, text);
        assert_eq!(encounters[0].forms.len(), 1);
    }

    #[test]
    fn split_encounters_do_not_carry_forms() {
        let text = "Consumer Service ID: 1\nConsumer Service ID: 2";
        let mut document = doc(text, text);
        document.forms.push("Consumer Service ID:", "1", 90.0);
        let encounters = segment(&document, DELIM, false);
        assert!(encounters.iter().all(|e| e.forms.is_empty()));
    }

    #[test]
    fn encounter_id_takes_first_token() {
        let encounter = Encounter {
            text: "Consumer Service ID: 12/34 extra words\nConsumer Service ID: 99".to_string(),
            ..Encounter::default()
        };
        assert_eq!(encounter_id(&encounter, DELIM).as_deref(), Some("12-34"));
        assert_eq!(encounter_id(&encounter, "Missing:"), None);
    }

    #[test]
    fn encounter_serializes_with_stored_field_names() {
        let text = "Consumer Service ID: 1\na\nConsumer Service ID: 2";
        let encounters = segment(&doc(text, text), DELIM, false);
        let json = serde_json::to_value(&encounters[0]).unwrap();
        assert_eq!(json["metadata"]["encounter_index"], 0);
        assert_eq!(json["metadata"]["is_split_encounter"], true);
        assert_eq!(json["metadata"]["start_line"], 0);
        assert!(json.get("forms").is_none());

        let back: Encounter = serde_json::from_value(json).unwrap();
        assert_eq!(back, encounters[0]);
    }
}
