//! Page-level fan-out
//!
//! Pages are captured on the calling thread into owned [`PageSnapshot`]s,
//! handed to a fixed pool of scoped worker threads over a bounded job channel,
//! and the results are reassembled in page order. Workers never see the
//! [`Document`]; the only write back is [`PageCoordinator::commit_compressed`],
//! which runs after a complete, uncancelled run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use log::{debug, trace, warn};

use crate::error::{PDFError, PDFResult};
use crate::pdf::lexer::{Lexer, Token};
use crate::pdf::{Dictionary, Document, Filter, Object, Page, Stream, DEFAULT_MEDIA_BOX};

/// Attributes a page may inherit from its ancestors
const INHERITED_KEYS: [&str; 4] = ["MediaBox", "CropBox", "Resources", "Rotate"];

/// Self-contained copy of one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    pub index: usize,
    /// Page dictionary with inherited attributes copied in and the
    /// `/Parent` and `/Contents` links removed
    pub dictionary: Dictionary,
    /// Decoded content streams joined with newlines
    pub contents: Vec<u8>,
}

impl PageSnapshot {
    pub fn capture(page: &Page<'_>) -> PDFResult<Self> {
        let mut dictionary = page.dictionary()?.clone();
        for key in INHERITED_KEYS {
            if let Some(value) = page.get_inherited(key)? {
                dictionary.set(key, value.clone());
            }
        }
        if !dictionary.has("MediaBox") {
            dictionary.set("MediaBox", DEFAULT_MEDIA_BOX.iter().map(|&v| Object::from(v)).collect::<Vec<_>>());
        }
        dictionary.remove("Parent");
        dictionary.remove("Contents");

        Ok(Self {
            index: page.index(),
            dictionary,
            contents: page.contents()?,
        })
    }
}

/// Work that can be run on a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTask {
    DecodeContents,
    CompressContents,
    Tokenize,
}

impl PageTask {
    pub fn execute(&self, snapshot: &PageSnapshot) -> PDFResult<PageOutput> {
        let index = snapshot.index;
        match self {
            PageTask::DecodeContents => Ok(PageOutput::Decoded {
                index,
                content: snapshot.contents.clone(),
            }),
            PageTask::CompressContents => Ok(PageOutput::Compressed {
                index,
                data: Filter::FlateDecode.encode(&snapshot.contents, None)?,
            }),
            PageTask::Tokenize => {
                let mut lexer = Lexer::new(&snapshot.contents);
                let mut tokens = Vec::new();
                loop {
                    match lexer.next_token()? {
                        Token::Eof => break,
                        token => tokens.push(token),
                    }
                }
                Ok(PageOutput::Tokens { index, tokens })
            }
        }
    }
}

/// Result of a [`PageTask`], tagged with its page index
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutput {
    Decoded { index: usize, content: Vec<u8> },
    Compressed { index: usize, data: Vec<u8> },
    Tokens { index: usize, tokens: Vec<Token> },
}

impl PageOutput {
    pub fn index(&self) -> usize {
        match self {
            PageOutput::Decoded { index, .. } | PageOutput::Compressed { index, .. } | PageOutput::Tokens { index, .. } => {
                *index
            }
        }
    }
}

/// Shared flag that stops a running fan-out
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs page tasks over a pool of worker threads
#[derive(Debug, Clone)]
pub struct PageCoordinator {
    workers: usize,
    token: CancellationToken,
}

impl Default for PageCoordinator {
    fn default() -> Self {
        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(workers)
    }
}

impl PageCoordinator {
    /// Create a coordinator with `workers` threads (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Capture every page of `document`
    pub fn snapshots(&self, document: &Document) -> PDFResult<Vec<PageSnapshot>> {
        document.pages()?.iter().map(PageSnapshot::capture).collect()
    }

    pub fn run(&self, snapshots: Vec<PageSnapshot>, task: PageTask) -> PDFResult<Vec<PageOutput>> {
        self.run_with(snapshots, |snapshot| task.execute(snapshot))
    }

    /// Apply `work` to every snapshot and return the results in page order
    ///
    /// Dispatch stops at the first failure or when the token is cancelled.
    /// A cancelled run discards everything and returns `Cancelled`; otherwise
    /// the failure with the lowest page index is returned.
    pub fn run_with<F, T>(&self, snapshots: Vec<PageSnapshot>, work: F) -> PDFResult<Vec<T>>
    where
        F: Fn(&PageSnapshot) -> PDFResult<T> + Sync,
        T: Send,
    {
        let total = snapshots.len();
        let workers = self.workers.min(total.max(1));
        let token = &self.token;
        let failed = AtomicBool::new(false);
        debug!("Dispatching {} pages to {} workers", total, workers);

        let mut results: Vec<(usize, PDFResult<T>)> = thread::scope(|scope| {
            let (job_sender, job_receiver) = mpsc::sync_channel::<PageSnapshot>(workers);
            let job_receiver = Arc::new(Mutex::new(job_receiver));
            let (result_sender, result_receiver) = mpsc::channel();

            for id in 0..workers {
                let job_receiver = Arc::clone(&job_receiver);
                let result_sender = result_sender.clone();
                let (work, failed) = (&work, &failed);
                scope.spawn(move || loop {
                    let job = match job_receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => break,
                    };
                    let Ok(snapshot) = job else { break };
                    if token.is_cancelled() || failed.load(Ordering::SeqCst) {
                        trace!("Worker {} skipping page {}", id, snapshot.index);
                        continue;
                    }
                    let result = work(&snapshot);
                    if result.is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    if result_sender.send((snapshot.index, result)).is_err() {
                        break;
                    }
                });
            }
            drop(result_sender);

            for snapshot in snapshots {
                if token.is_cancelled() || failed.load(Ordering::SeqCst) {
                    break;
                }
                if job_sender.send(snapshot).is_err() {
                    break;
                }
            }
            drop(job_sender);

            result_receiver.into_iter().collect()
        });

        if token.is_cancelled() {
            warn!("Page run cancelled, discarding {} results", results.len());
            return Err(PDFError::Cancelled);
        }

        results.sort_by_key(|(index, _)| *index);
        let outputs = results.into_iter().map(|(_, result)| result).collect::<PDFResult<Vec<T>>>()?;
        debug!("Completed {} of {} pages", outputs.len(), total);
        Ok(outputs)
    }

    /// Install compressed contents produced by [`PageTask::CompressContents`]
    ///
    /// Each page gets a single FlateDecode content stream. Other output kinds
    /// are ignored. Nothing is written once the token has been cancelled.
    pub fn commit_compressed(&self, document: &mut Document, outputs: &[PageOutput]) -> PDFResult<usize> {
        if self.token.is_cancelled() {
            return Err(PDFError::Cancelled);
        }

        let mut committed = 0;
        for output in outputs {
            let PageOutput::Compressed { index, data } = output else {
                continue;
            };
            let page = document.get_page(*index)?.id();
            let mut dict = Dictionary::new();
            dict.set("Filter", Object::name("FlateDecode"));
            let stream = document.add_object(Stream::new(dict, data.clone()));
            document.get_dictionary_mut(page)?.set("Contents", stream);
            committed += 1;
        }
        debug!("Committed compressed contents for {} pages", committed);
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::lexer::Keyword;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn document_with_pages(count: usize) -> PDFResult<Document> {
        let mut document = Document::new();
        for i in 0..count {
            document.add_page(Dictionary::new())?;
            document.set_page_contents(i, format!("BT /F1 12 Tf ({}) Tj ET", i).into_bytes())?;
        }
        Ok(document)
    }

    #[test_log::test]
    fn test_snapshot_materialises_inherited_attributes() -> PDFResult<()> {
        let mut document = document_with_pages(1)?;
        let root = document.catalog()?.get_reference("Pages").ok_or(PDFError::PageNotFound(0))?;
        let mut font = Dictionary::new();
        font.set("F1", Object::name("Helvetica"));
        let mut resources = Dictionary::new();
        resources.set("Font", font);
        document.get_dictionary_mut(root)?.set("Resources", resources.clone());
        document.get_dictionary_mut(root)?.set("Rotate", 90);

        let snapshot = PageSnapshot::capture(&document.get_page(0)?)?;
        assert_eq!(snapshot.index, 0);
        assert_eq!(snapshot.dictionary.get_dict("Resources"), Some(&resources));
        assert_eq!(snapshot.dictionary.get_i64("Rotate"), Some(90));
        assert_eq!(snapshot.dictionary.get_array("MediaBox").map(Vec::len), Some(4));
        assert!(!snapshot.dictionary.has("Parent"));
        assert!(!snapshot.dictionary.has("Contents"));
        assert_eq!(snapshot.contents, b"BT /F1 12 Tf (0) Tj ET".to_vec());
        Ok(())
    }

    #[rstest]
    #[case::single_worker(1)]
    #[case::fewer_workers_than_pages(3)]
    #[case::more_workers_than_pages(32)]
    fn test_results_in_page_order(#[case] workers: usize) -> PDFResult<()> {
        let document = document_with_pages(12)?;
        let coordinator = PageCoordinator::new(workers);
        let outputs = coordinator.run(coordinator.snapshots(&document)?, PageTask::DecodeContents)?;

        let indices: Vec<usize> = outputs.iter().map(PageOutput::index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert_eq!(
            outputs[7],
            PageOutput::Decoded {
                index: 7,
                content: b"BT /F1 12 Tf (7) Tj ET".to_vec(),
            }
        );
        Ok(())
    }

    #[test_log::test]
    fn test_tokenize_contents() -> PDFResult<()> {
        let document = document_with_pages(1)?;
        let coordinator = PageCoordinator::new(2);
        let outputs = coordinator.run(coordinator.snapshots(&document)?, PageTask::Tokenize)?;

        let PageOutput::Tokens { tokens, .. } = &outputs[0] else {
            panic!("expected tokens, got {:?}", outputs[0]);
        };
        assert_eq!(
            tokens,
            &vec![
                Token::Keyword(Keyword::Other("BT".to_string())),
                Token::Name(b"F1".to_vec()),
                Token::Integer(12),
                Token::Keyword(Keyword::Other("Tf".to_string())),
                Token::LiteralString(b"0".to_vec()),
                Token::Keyword(Keyword::Other("Tj".to_string())),
                Token::Keyword(Keyword::Other("ET".to_string())),
            ]
        );
        Ok(())
    }

    #[test_log::test]
    fn test_compress_and_commit() -> PDFResult<()> {
        let mut document = document_with_pages(4)?;
        let coordinator = PageCoordinator::new(2);
        let outputs = coordinator.run(coordinator.snapshots(&document)?, PageTask::CompressContents)?;
        assert_eq!(coordinator.commit_compressed(&mut document, &outputs)?, 4);

        for i in 0..4 {
            let page = document.get_page(i)?;
            let content = page.content_ids()?[0];
            assert_eq!(document.get_stream(content)?.dict().get_name("Filter"), Some("FlateDecode"));
            assert_eq!(page.contents()?, format!("BT /F1 12 Tf ({}) Tj ET", i).into_bytes());
        }
        Ok(())
    }

    #[test_log::test]
    fn test_cancelled_run_discards_results() -> PDFResult<()> {
        let mut document = document_with_pages(8)?;
        let coordinator = PageCoordinator::new(2);
        let snapshots = coordinator.snapshots(&document)?;
        let token = coordinator.cancellation_token();

        let result = coordinator.run_with(snapshots, |snapshot| {
            if snapshot.index == 2 {
                token.cancel();
            }
            PageTask::CompressContents.execute(snapshot)
        });
        assert!(matches!(result, Err(PDFError::Cancelled)));

        let before = document.get_page(0)?.content_ids()?;
        let late = vec![PageOutput::Compressed { index: 0, data: Vec::new() }];
        assert!(matches!(coordinator.commit_compressed(&mut document, &late), Err(PDFError::Cancelled)));
        assert_eq!(document.get_page(0)?.content_ids()?, before);
        Ok(())
    }

    #[test_log::test]
    fn test_shared_token() -> PDFResult<()> {
        let document = document_with_pages(3)?;
        let token = CancellationToken::new();
        let coordinator = PageCoordinator::new(2).with_cancellation(token.clone());
        token.cancel();
        assert!(coordinator.cancellation_token().is_cancelled());

        let result = coordinator.run(coordinator.snapshots(&document)?, PageTask::DecodeContents);
        assert!(matches!(result, Err(PDFError::Cancelled)));
        Ok(())
    }

    #[test_log::test]
    fn test_first_failure_is_returned() -> PDFResult<()> {
        let document = document_with_pages(6)?;
        let coordinator = PageCoordinator::new(1);
        let result = coordinator.run_with(coordinator.snapshots(&document)?, |snapshot| {
            if snapshot.index >= 3 {
                return Err(PDFError::PageNotFound(snapshot.index));
            }
            Ok(snapshot.index)
        });
        assert!(matches!(result, Err(PDFError::PageNotFound(3))));
        Ok(())
    }

    #[test_log::test]
    fn test_empty_run() -> PDFResult<()> {
        let coordinator = PageCoordinator::default();
        assert_eq!(coordinator.run(Vec::new(), PageTask::Tokenize)?, Vec::new());
        Ok(())
    }
}
