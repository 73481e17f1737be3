//! End-to-end runs against a scripted model, an in-memory graph store and
//! an in-memory passage corpus.

use cellgraph_metric::evaluate_bleu_score;
use cellgraph_pipeline::{
    run_pipeline, Collaborators, GraphContext, PipelineConfig, PipelineError, ResultTable, RowKey,
};
use cellgraph_retrieval::{
    GraphSession, GraphStore, GraphStoreError, KeywordRetriever, LanguageModel, LlmError,
    LlmResponse, ModelProvider, Passage, Record,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const INPUT: &str = "\
dataset,tissue,marker,manual annotation,manual CLname,manual broadtype
GTEx,Breast,CD3E,T cell,T-cell,Lymphocyte
GTEx,Breast,NKG7,natural killer cell,NK cell,Lymphocyte
GTEx,Lung,SFTPC,type II pneumocyte,,Epithelial cell
literature,NA,FAIL,B cell,,Lymphocyte
";

// ============================================================================
// Stubs
// ============================================================================

/// Writes Cypher when asked to, otherwise answers from the graph evidence or
/// the marker named in the prompt. Prompts mentioning `FAIL` error out.
#[derive(Default)]
struct ScriptedModels {
    calls: AtomicUsize,
}

struct ScriptedModel<'a>(&'a ScriptedModels);

impl ModelProvider for ScriptedModels {
    fn language_model(&self, _model: &str) -> Box<dyn LanguageModel + '_> {
        Box::new(ScriptedModel(self))
    }
}

impl LanguageModel for ScriptedModel<'_> {
    fn invoke(&self, prompt: &str) -> Result<LlmResponse, LlmError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("FAIL") {
            return Err(LlmError::Api {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        let content = if prompt.starts_with("Task: Generate Cypher") {
            "Two lookups:\n```cypher\nMATCH (g:Gene)-[:MARKER_OF]->(c:CellType) RETURN c.name AS cell\n```\n\
             ```cypher\nMATCH (c:CellType)-[:IS_A]->(b:CellType) RETURN b.name AS broad\n```"
                .to_string()
        } else if prompt.contains("cell: natural killer cell") {
            "Natural killer cells | Lymphocytes".to_string()
        } else if prompt.contains("CD3E") {
            "T cells, probably activated | Lymphocyte".to_string()
        } else if prompt.contains("NKG7") {
            "NK cell | Lymphocyte".to_string()
        } else {
            "Alveolar macrophage | Myeloid cell".to_string()
        };
        Ok(LlmResponse { content })
    }
}

#[derive(Default)]
struct MemoryGraph {
    statements: Mutex<Vec<String>>,
    open_sessions: AtomicUsize,
}

struct MemorySession<'a>(&'a MemoryGraph);

impl GraphStore for MemoryGraph {
    fn open_session(&self) -> Result<Box<dyn GraphSession + '_>, GraphStoreError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession(self)))
    }
}

impl GraphSession for MemorySession<'_> {
    fn run(&mut self, query: &str) -> Result<Vec<Record>, GraphStoreError> {
        self.0.statements.lock().unwrap().push(query.to_string());
        if query.contains("AS broad") {
            Ok(vec![Record::new(vec![("broad".to_string(), json!("Lymphocyte"))])])
        } else {
            Ok(vec![Record::new(vec![("cell".to_string(), json!("natural killer cell"))])])
        }
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.0.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

fn workspace() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("dataset_init.csv");
    std::fs::write(&input, INPUT).unwrap();
    (dir, input)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_direct_method_over_whole_input() {
    let (dir, input) = workspace();
    let save = dir.path().join("results").join("results.csv");
    let models = ScriptedModels::default();

    let report = run_pipeline(
        &PipelineConfig::new(&input, "deepseek-r1", "human", &save),
        &Collaborators::new(&models),
    )
    .unwrap();

    assert_eq!(report.annotation.rows, 4);
    assert_eq!(report.annotation.annotated, 3);
    assert_eq!(report.annotation.failed, 1);
    assert_eq!(report.scoring.scored, 3);
    assert_eq!(report.scoring.skipped_no_prediction, 1);

    let table = ResultTable::load(&save).unwrap();
    let cd3e = table.find(&RowKey::new("GTEx", "Breast", "CD3E"))[0];
    let record = cd3e.method("DeepSeek-R1").unwrap();
    assert_eq!(record.annotation.as_deref(), Some("T cells, probably activated"));
    assert_eq!(record.bleu_1, Some(100.0));
    assert_eq!(record.bleu_avg_final, Some(100.0));

    let failed = table.find(&RowKey::new("literature", "NA", "FAIL"))[0];
    let record = failed.method("DeepSeek-R1");
    assert!(record.map_or(true, |r| r.annotation.is_none() && r.bleu_1.is_none()));

    let expected = evaluate_bleu_score(&["type II pneumocyte"], "Alveolar macrophage").unwrap();
    let sftpc = table.find(&RowKey::new("GTEx", "Lung", "SFTPC"))[0];
    assert_eq!(sftpc.method("DeepSeek-R1").unwrap().bleu_avg, Some(expected.bleu_avg));
}

#[test]
fn test_graph_method_runs_every_block() {
    let (dir, input) = workspace();
    let save = dir.path().join("results.csv");
    let models = ScriptedModels::default();
    let graph = MemoryGraph::default();
    let examples = vec!["MATCH (g:Gene {name: 'CD3E'})-[:MARKER_OF]->(c) RETURN c.name".to_string()];
    let collaborators = Collaborators::new(&models).with_graph(GraphContext {
        store: &graph,
        schema: "(:Gene)-[:MARKER_OF]->(:CellType)-[:IS_A]->(:CellType)",
        examples: &examples,
    });

    let mut config = PipelineConfig::new(&input, "deepseek-v3-kg-graph-rag", "human", &save);
    config.dataset = Some("GTEx".to_string());
    config.tissue = Some("Breast".to_string());
    let report = run_pipeline(&config, &collaborators).unwrap();

    assert_eq!(report.annotation.rows, 2);
    assert_eq!(report.annotation.annotated, 2);
    // two blocks per row, one session per row, all released
    assert_eq!(graph.statements.lock().unwrap().len(), 4);
    assert_eq!(graph.open_sessions.load(Ordering::SeqCst), 0);

    let table = ResultTable::load(&save).unwrap();
    let nkg7 = table.find(&RowKey::new("GTEx", "Breast", "NKG7"))[0];
    let record = nkg7.method("DeepSeek-V3-KG-Graph-RAG").unwrap();
    assert_eq!(record.annotation.as_deref(), Some("Natural killer cells"));
    assert_eq!(record.bleu_1, Some(100.0));
    assert_eq!(record.broadtype_bleu_avg, Some(100.0));

    let lung = table.find(&RowKey::new("GTEx", "Lung", "SFTPC"))[0];
    assert!(lung.method("DeepSeek-V3-KG-Graph-RAG").is_none());
}

#[test]
fn test_rag_method_needs_a_corpus() {
    let (dir, input) = workspace();
    let save = dir.path().join("results.csv");
    let models = ScriptedModels::default();

    let err = run_pipeline(
        &PipelineConfig::new(&input, "deepseek-r1-rag", "human", &save),
        &Collaborators::new(&models),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::MissingCollaborator { .. }));
    assert_eq!(models.calls.load(Ordering::SeqCst), 0);

    let corpus = KeywordRetriever::new(vec![Passage {
        id: "nk".to_string(),
        text: "NKG7 and GNLY mark natural killer cells.".to_string(),
    }]);
    let mut config = PipelineConfig::new(&input, "deepseek-r1-rag", "human", &save);
    config.dataset = Some("GTEx".to_string());
    let report = run_pipeline(&config, &Collaborators::new(&models).with_documents(&corpus)).unwrap();
    assert_eq!(report.annotation.annotated, 3);
    assert_eq!(report.scoring.scored, 3);
}

#[test]
fn test_second_method_extends_first_results() {
    let (dir, input) = workspace();
    let save = dir.path().join("results.csv");
    let models = ScriptedModels::default();

    let mut first = PipelineConfig::new(&input, "deepseek-r1", "human", &save);
    first.dataset = Some("GTEx".to_string());
    run_pipeline(&first, &Collaborators::new(&models)).unwrap();

    let mut second = PipelineConfig::new(&input, "deepseek-v3", "human", &save);
    second.dataset = Some("GTEx".to_string());
    second.init_result_path = Some(save.clone());
    run_pipeline(&second, &Collaborators::new(&models)).unwrap();

    let table = ResultTable::load(&save).unwrap();
    let names = table.column_names();
    assert!(names.contains(&"DeepSeek-R1 BLEU-avg-final".to_string()));
    assert!(names.contains(&"DeepSeek-V3 BLEU-avg-final".to_string()));
    let nkg7 = table.find(&RowKey::new("GTEx", "Breast", "NKG7"))[0];
    assert_eq!(
        nkg7.method("DeepSeek-R1").unwrap().annotation,
        nkg7.method("DeepSeek-V3").unwrap().annotation
    );
}
