//! The real-estate consultation form.

use crate::error::FlowError;
use crate::validate::Validator;

use super::definition::FlowDefinition;
use super::step::{Section, Step};

pub const OTHER: &str = "Другое";
pub const OTHER_CITY: &str = "В другом городе";

/// Shown once the purchase timeline is known.
const FINANCING_NOTE: &str = "ℹ️ <b>Знаете ли вы, что можно купить недвижимость:</b>\n\n\
✅ с господдержкой\n\
✅ с субсидированной ставкой\n\
✅ в рассрочку\n\
✅ без первоначального взноса\n\n\
Мы расскажем вам подробнее об этих возможностях после заполнения анкеты.";

/// Build the canonical intake flow.
pub fn intake_flow() -> Result<FlowDefinition, FlowError> {
    use Section::*;

    let steps = vec![
        // ── Situation ───────────────────────────────────────────────
        Step::new("residence", "residence", Situation)
            .label("🏠 Текущее жилье")
            .prompt("🏠 Где вы сейчас живёте?")
            .choices_or_text(&[
                "В своей квартире",
                "Снимаю квартиру",
                "Живу с родителями",
                "Живу с парнем/девушкой",
                "В общежитии",
                OTHER,
            ])
            .branch(&[(OTHER, "residence_other")], "satisfaction"),
        Step::new("residence_other", "residence", Situation)
            .prompt("Пожалуйста, опишите ваши текущие жилищные условия:")
            .back("residence")
            .next("satisfaction"),
        Step::new("satisfaction", "satisfaction", Situation)
            .label("😊 Довольны условиями")
            .prompt("Вы довольны текущими условиями проживания?")
            .choices(&["Да, всё устраивает", "Нет, хочу улучшить", "Затрудняюсь ответить"])
            .back("residence")
            .next("property_type"),
        Step::new("property_type", "property_type", Situation)
            .label("🏢 Тип недвижимости")
            .prompt("Какой тип недвижимости вы хотели бы приобрести?")
            .choices(&[
                "Квартира в новостройке",
                "Вторичка",
                "Дом",
                "Таунхаус",
                "Участок под строительство",
                "Пока не решил(а)",
            ])
            .back("satisfaction")
            .next("location"),
        Step::new("location", "location", Situation)
            .label("📍 Желаемое расположение")
            .prompt("Где бы вы хотели приобрести недвижимость?")
            .choices(&["В текущем городе", OTHER_CITY, "За городом", "Пока не знаю"])
            .back("property_type")
            .branch(&[(OTHER_CITY, "location_city")], "budget"),
        Step::new("location_city", "location", Situation)
            .prompt("Пожалуйста, укажите город:")
            .value_prefix("В другом городе: ")
            .back("location")
            .next("budget"),
        Step::new("budget", "budget", Situation)
            .label("💰 Бюджет")
            .prompt("Какой у вас примерный бюджет?")
            .choices(&[
                "До 2 млн ₽",
                "2–5 млн ₽",
                "5–10 млн ₽",
                "10+ млн ₽",
                "Затрудняюсь ответить",
            ])
            .back("location")
            .next("search_status"),
        Step::new("search_status", "search_status", Situation)
            .label("🔍 Статус поиска")
            .prompt("Вы уже подбирали варианты?")
            .choices(&[
                "Да, активно ищу",
                "Смотрю, но пока без спешки",
                "Нет, только начал(а) интересоваться",
                "Нет, но хочу узнать, как начать",
            ])
            .back("budget")
            .next("mortgage"),
        // ── Readiness ───────────────────────────────────────────────
        Step::new("mortgage", "mortgage", Readiness)
            .label("🏦 Ипотека")
            .prompt("Рассматриваете ли вы ипотеку?")
            .choices(&["Да", "Нет", "Возможно"])
            .back("search_status")
            .next("purchase_time"),
        Step::new("purchase_time", "purchase_time", Readiness)
            .label("⏱ Планируемое время покупки")
            .prompt("Когда вы планируете покупку?")
            .choices(&["В ближайший месяц", "Через 3–6 месяцев", "В течение года", "Пока не знаю"])
            .note(FINANCING_NOTE)
            .back("mortgage")
            .next("name"),
        // ── Contact ─────────────────────────────────────────────────
        Step::new("name", "name", Contact)
            .label("👤 Имя")
            .prompt("Как вас зовут? (имя и фамилия)")
            .validator(Validator::FreeText { min_chars: 2 })
            .back("purchase_time")
            .next("contact_method"),
        Step::new("contact_method", "contact_method", Contact)
            .label("📞 Предпочтительный способ связи")
            .prompt("Как вам лучше всего связаться?")
            .choices_or_text(&[
                "По телефону",
                "Написать в Telegram",
                "Написать в WhatsApp",
                "E-mail",
                OTHER,
            ])
            .back("name")
            .branch(&[(OTHER, "contact_method_other")], "contact_time"),
        Step::new("contact_method_other", "contact_method", Contact)
            .prompt("Пожалуйста, укажите предпочтительный способ связи:")
            .back("contact_method")
            .next("contact_time"),
        Step::new("contact_time", "contact_time", Contact)
            .label("📅 Удобное время для связи")
            .prompt("Укажите удобный день и время для связи:")
            .back("contact_method")
            .next("phone"),
        Step::new("phone", "phone", Contact)
            .label("📱 Телефон")
            .prompt("📱 Укажите ваш номер телефона для связи или отправьте контакт")
            .validator(Validator::Phone)
            .back("contact_time")
            .next("confirm"),
        Step::new("confirm", "confirm", Contact)
            .prompt("📋 <b>Проверьте введенные данные:</b>")
            .back("phone")
            .terminal(),
    ];

    FlowDefinition::new(steps, "residence")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::StepId;

    #[test]
    fn intake_flow_is_valid() {
        let flow = intake_flow().unwrap();
        assert_eq!(flow.entry().id, StepId("residence"));
        assert_eq!(flow.confirm().id, StepId("confirm"));
        assert!(flow.entry().back.is_none());
    }

    #[test]
    fn every_non_entry_step_has_back_edge() {
        let flow = intake_flow().unwrap();
        for step in flow.steps() {
            if step.id != flow.entry().id {
                assert!(step.back.is_some(), "{} should have a back edge", step.id);
            }
        }
    }

    #[test]
    fn section_starts() {
        let flow = intake_flow().unwrap();
        let start = |s| flow.section_start(s).map(|step| step.id);
        assert_eq!(start(Section::Situation), Some(StepId("residence")));
        assert_eq!(start(Section::Readiness), Some(StepId("mortgage")));
        assert_eq!(start(Section::Contact), Some(StepId("name")));
    }

    #[test]
    fn satellites_share_parent_field() {
        let flow = intake_flow().unwrap();
        for (satellite, field) in [
            ("residence_other", "residence"),
            ("location_city", "location"),
            ("contact_method_other", "contact_method"),
        ] {
            let step = flow.step(satellite).unwrap();
            assert_eq!(step.field, field);
            assert!(step.is_satellite());
        }
    }

    #[test]
    fn section_fields_in_order() {
        let flow = intake_flow().unwrap();
        let fields: Vec<&str> = Section::ALL
            .iter()
            .flat_map(|s| flow.section_fields(*s).map(|step| step.field).collect::<Vec<_>>())
            .collect();
        assert_eq!(
            fields,
            vec![
                "residence",
                "satisfaction",
                "property_type",
                "location",
                "budget",
                "search_status",
                "mortgage",
                "purchase_time",
                "name",
                "contact_method",
                "contact_time",
                "phone",
            ]
        );
    }
}
